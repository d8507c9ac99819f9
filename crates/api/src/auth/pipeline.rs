//! Login filter chain
//!
//! Each [`AuthenticationFilter`] claims one login route. When a request hits a
//! claimed route the pipeline runs the filter's pre-check, builds a token from
//! the submitted fields, authenticates it, binds the result to a fresh session
//! and hands the outcome to the success or failure handler. Requests on other
//! routes pass straight through.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use authgate_shared::{AuthError, SessionId};
use axum::{
    extract::{ConnectInfo, FromRequest, Query, Request, State},
    http::{header::SET_COOKIE, Method},
    middleware::Next,
    response::Response,
    Form,
};

use super::context::{extract_session_id, session_cookie, SecurityContextRepository, SessionCookieConfig};
use super::handlers::{
    AuthenticationFailureHandler, AuthenticationSuccessHandler, JsonFailureHandler,
    RedirectSuccessHandler,
};
use super::manager::AuthenticationManager;
use super::sessions::SessionRegistry;
use super::token::{AuthenticationToken, RequestDetails};
use super::verification::{VerificationCodeStore, LOGIN_PURPOSE};

/// Path (and optionally method) a filter claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    path: String,
    method: Option<Method>,
}

impl RouteGuard {
    /// Match `path` with any method
    pub fn any(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: None,
        }
    }

    /// Match `path` with POST only
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Some(Method::POST),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `None` when any method matches
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Paths compare case-insensitively
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.path.eq_ignore_ascii_case(path)
            && self.method.as_ref().map_or(true, |m| m == method)
    }
}

/// Submitted login fields, merged from the query string and a urlencoded body
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    fields: HashMap<String, String>,
}

impl LoginForm {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    /// Body fields win over query fields of the same name
    pub async fn extract(request: Request) -> Self {
        let mut fields = Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .map(|Query(query)| query)
            .unwrap_or_default();

        if request.method() != Method::GET {
            if let Ok(Form(body)) =
                Form::<HashMap<String, String>>::from_request(request, &()).await
            {
                fields.extend(body);
            }
        }

        Self { fields }
    }

    /// Trimmed value, empty when absent
    pub fn field(&self, name: &str) -> String {
        self.fields
            .get(name)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }
}

pub trait AuthenticationFilter: Send + Sync {
    fn guard(&self) -> &RouteGuard;

    /// Runs before any token exists; an error skips authentication entirely
    fn pre_authenticate(&self, _form: &LoginForm) -> Result<(), AuthError> {
        Ok(())
    }

    fn build_token(&self, form: &LoginForm) -> AuthenticationToken;
}

/// Username/password form login
#[derive(Debug, Clone)]
pub struct PasswordLoginFilter {
    guard: RouteGuard,
    username_parameter: String,
    password_parameter: String,
}

impl PasswordLoginFilter {
    pub fn new(guard: RouteGuard) -> Self {
        Self {
            guard,
            username_parameter: "username".to_string(),
            password_parameter: "password".to_string(),
        }
    }

    pub fn with_parameters(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username_parameter = username.into();
        self.password_parameter = password.into();
        self
    }
}

impl AuthenticationFilter for PasswordLoginFilter {
    fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    fn build_token(&self, form: &LoginForm) -> AuthenticationToken {
        AuthenticationToken::password(
            form.field(&self.username_parameter),
            form.field(&self.password_parameter),
        )
    }
}

/// Mobile number plus one-time code login
pub struct SmsCodeLoginFilter {
    guard: RouteGuard,
    codes: Arc<VerificationCodeStore>,
    mobile_parameter: String,
    code_parameter: String,
}

impl SmsCodeLoginFilter {
    pub fn new(guard: RouteGuard, codes: Arc<VerificationCodeStore>) -> Self {
        Self {
            guard,
            codes,
            mobile_parameter: "mobile".to_string(),
            code_parameter: "smsCode".to_string(),
        }
    }

    pub fn with_parameters(mut self, mobile: impl Into<String>, code: impl Into<String>) -> Self {
        self.mobile_parameter = mobile.into();
        self.code_parameter = code.into();
        self
    }
}

impl AuthenticationFilter for SmsCodeLoginFilter {
    fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    fn pre_authenticate(&self, form: &LoginForm) -> Result<(), AuthError> {
        self.codes.check(
            LOGIN_PURPOSE,
            &form.field(&self.mobile_parameter),
            &form.field(&self.code_parameter),
        )
    }

    fn build_token(&self, form: &LoginForm) -> AuthenticationToken {
        AuthenticationToken::sms_code(form.field(&self.mobile_parameter))
    }
}

pub struct AuthenticationPipeline {
    filters: Vec<Arc<dyn AuthenticationFilter>>,
    manager: AuthenticationManager,
    sessions: Arc<SessionRegistry>,
    contexts: Arc<SecurityContextRepository>,
    success_handler: Arc<dyn AuthenticationSuccessHandler>,
    failure_handler: Arc<dyn AuthenticationFailureHandler>,
    cookie: SessionCookieConfig,
    post_only: bool,
}

impl AuthenticationPipeline {
    pub fn new(
        manager: AuthenticationManager,
        sessions: Arc<SessionRegistry>,
        contexts: Arc<SecurityContextRepository>,
    ) -> Self {
        Self {
            filters: Vec::new(),
            manager,
            sessions,
            contexts,
            success_handler: Arc::new(RedirectSuccessHandler::default()),
            failure_handler: Arc::new(JsonFailureHandler::default()),
            cookie: SessionCookieConfig::default(),
            post_only: true,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn AuthenticationFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_success_handler(mut self, handler: Arc<dyn AuthenticationSuccessHandler>) -> Self {
        self.success_handler = handler;
        self
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn AuthenticationFailureHandler>) -> Self {
        self.failure_handler = handler;
        self
    }

    pub fn with_cookie(mut self, cookie: SessionCookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Reject non-POST requests on method-agnostic guards with
    /// `MethodNotSupported`
    pub fn post_only(mut self, post_only: bool) -> Self {
        self.post_only = post_only;
        self
    }

    /// Filter claiming this request, if any
    fn matching_filter(&self, method: &Method, path: &str) -> Option<Arc<dyn AuthenticationFilter>> {
        self.filters
            .iter()
            .find(|filter| filter.guard().matches(method, path))
            .cloned()
    }

    /// Run one login attempt through to an admitted, stored session
    pub async fn authenticate_request(
        &self,
        filter: &dyn AuthenticationFilter,
        request: Request,
    ) -> Result<(AuthenticationToken, SessionId), AuthError> {
        if self.post_only && filter.guard().method().is_none() && request.method() != Method::POST {
            return Err(AuthError::MethodNotSupported(request.method().to_string()));
        }

        let previous = extract_session_id(request.headers(), &self.cookie.name);
        let details = RequestDetails {
            remote_address: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
            session_id: previous,
        };

        let form = LoginForm::extract(request).await;
        filter.pre_authenticate(&form)?;

        let token = filter.build_token(&form).with_details(details);
        let authentication = self.manager.authenticate(token).await?;

        let session_id = SessionId::new();
        self.sessions
            .admit_replacing(authentication.principal(), session_id, previous)?;

        // A login never keeps the session id it arrived with
        if let Some(previous) = previous {
            self.contexts.remove(previous);
            self.sessions.remove(previous);
        }
        self.contexts.save(session_id, authentication.clone());

        tracing::info!(
            principal = %authentication.principal(),
            scheme = %authentication.scheme(),
            session_id = %session_id,
            "Login complete"
        );

        Ok((authentication, session_id))
    }

    async fn handle(&self, filter: &dyn AuthenticationFilter, request: Request) -> Response {
        match self.authenticate_request(filter, request).await {
            Ok((authentication, session_id)) => {
                let mut response = self.success_handler.on_authentication_success(&authentication);
                match session_cookie(&self.cookie, session_id) {
                    Ok(cookie) => {
                        response.headers_mut().append(SET_COOKIE, cookie);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to build session cookie"),
                }
                response
            }
            Err(e) => self.failure_handler.on_authentication_failure(&e),
        }
    }
}

/// Middleware entry point for the login filter chain
pub async fn authentication_pipeline(
    State(pipeline): State<Arc<AuthenticationPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(filter) = pipeline.matching_filter(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };

    pipeline.handle(filter.as_ref(), request).await
}
