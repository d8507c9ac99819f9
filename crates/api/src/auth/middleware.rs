//! Per-request session checks and the access rule

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use time::OffsetDateTime;

use super::context::{
    clear_session_cookie, extract_session_id, SecurityContext, SecurityContextRepository,
    SessionCookieConfig,
};
use super::handlers::{ExpiredSessionStrategy, JsonExpiredSessionStrategy};
use super::sessions::{SessionRegistry, SessionStatus};

/// Paths matched exactly (case-insensitive) or, with a trailing `/*`, by prefix
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    patterns: Vec<String>,
}

impl PathMatcher {
    pub fn new<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.patterns.iter().any(|pattern| {
            let pattern = pattern.to_ascii_lowercase();
            match pattern.strip_suffix("/*") {
                Some(prefix) => path == prefix || path.starts_with(&format!("{prefix}/")),
                None => path == pattern,
            }
        })
    }
}

/// State for [`session_management`]
pub struct SessionManagement {
    sessions: Arc<SessionRegistry>,
    contexts: Arc<SecurityContextRepository>,
    cookie: SessionCookieConfig,
    expired_strategy: Arc<dyn ExpiredSessionStrategy>,
    invalid_session_url: String,
    /// Paths that skip session checks entirely
    exempt: PathMatcher,
}

impl SessionManagement {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        contexts: Arc<SecurityContextRepository>,
        cookie: SessionCookieConfig,
        invalid_session_url: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            contexts,
            cookie,
            expired_strategy: Arc::new(JsonExpiredSessionStrategy),
            invalid_session_url: invalid_session_url.into(),
            exempt: PathMatcher::default(),
        }
    }

    pub fn with_expired_strategy(mut self, strategy: Arc<dyn ExpiredSessionStrategy>) -> Self {
        self.expired_strategy = strategy;
        self
    }

    pub fn with_exempt(mut self, exempt: PathMatcher) -> Self {
        self.exempt = exempt;
        self
    }

    fn clearing_cookie(&self, mut response: Response) -> Response {
        if let Ok(cookie) = clear_session_cookie(&self.cookie) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }

    fn invalid_session(&self) -> Response {
        self.clearing_cookie(Redirect::to(&self.invalid_session_url).into_response())
    }
}

/// Resolve the session cookie into a [`SecurityContext`] request extension.
///
/// - evicted session: rendered once by the expired-session strategy, then
///   forgotten
/// - unknown or idle session: redirected to the invalid-session URL
/// - active session: last access refreshed, context attached
pub async fn session_management(
    State(state): State<Arc<SessionManagement>>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.exempt.matches(request.uri().path()) {
        return next.run(request).await;
    }
    let Some(session_id) = extract_session_id(request.headers(), &state.cookie.name) else {
        return next.run(request).await;
    };

    match state.sessions.status(session_id) {
        SessionStatus::Active => match state.contexts.load(session_id) {
            Some(context) => {
                state.sessions.refresh(session_id, OffsetDateTime::now_utc());
                request.extensions_mut().insert(context);
                next.run(request).await
            }
            None => {
                // Context timed out while the registry still counted it
                state.sessions.remove(session_id);
                tracing::debug!(session_id = %session_id, "Session idle, removed");
                state.invalid_session()
            }
        },
        SessionStatus::Expired => match state.sessions.take_expired(session_id) {
            Some(record) => {
                state.contexts.remove(session_id);
                state.clearing_cookie(state.expired_strategy.on_expired_session_detected(&record))
            }
            None => state.invalid_session(),
        },
        SessionStatus::Unknown => {
            state.contexts.remove(session_id);
            tracing::debug!(session_id = %session_id, "Request carried an unknown session");
            state.invalid_session()
        }
    }
}

/// State for [`require_authentication`]
#[derive(Debug, Clone)]
pub struct AccessRule {
    permitted: PathMatcher,
    login_page: String,
    login_form_page: String,
}

impl AccessRule {
    pub fn new(
        permitted: PathMatcher,
        login_page: impl Into<String>,
        login_form_page: impl Into<String>,
    ) -> Self {
        Self {
            permitted,
            login_page: login_page.into(),
            login_form_page: login_form_page.into(),
        }
    }

    /// Where an unauthenticated request for `path` is sent
    pub fn entry_point(&self, path: &str) -> &str {
        if path.to_ascii_lowercase().ends_with(".html") {
            &self.login_form_page
        } else {
            &self.login_page
        }
    }
}

/// Reject requests without a security context unless the path is permitted
pub async fn require_authentication(
    State(rule): State<Arc<AccessRule>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if rule.permitted.matches(path) || request.extensions().get::<SecurityContext>().is_some() {
        return next.run(request).await;
    }

    let target = rule.entry_point(path);
    tracing::debug!(path = %path, target = %target, "Unauthenticated request sent to entry point");
    Redirect::to(target).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::token::AuthenticationToken;
    use authgate_shared::{Principal, SessionId};
    use axum::{
        body::Body,
        http::{
            header::{COOKIE, LOCATION},
            StatusCode,
        },
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    struct Fixture {
        router: Router,
        sessions: Arc<SessionRegistry>,
        contexts: Arc<SecurityContextRepository>,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(SessionRegistry::default());
        let contexts = Arc::new(SecurityContextRepository::default());

        let management = SessionManagement::new(
            sessions.clone(),
            contexts.clone(),
            SessionCookieConfig::default(),
            "/session/invalid",
        )
        .with_exempt(PathMatcher::new(["/session/invalid"]));
        let rule = AccessRule::new(
            PathMatcher::new(["/session/invalid", "/authentication/require", "/health/*"]),
            "/authentication/require",
            "/login.html",
        );

        let router = Router::new()
            .route(
                "/index",
                get(|Extension(context): Extension<SecurityContext>| async move {
                    context.authentication.principal().to_string()
                }),
            )
            .route("/health/live", get(|| async { "OK" }))
            .layer(middleware::from_fn_with_state(Arc::new(rule), require_authentication))
            .layer(middleware::from_fn_with_state(
                Arc::new(management),
                session_management,
            ));

        Fixture {
            router,
            sessions,
            contexts,
        }
    }

    fn login(fx: &Fixture, username: &str) -> SessionId {
        let id = SessionId::new();
        fx.sessions.admit(username, id).unwrap();
        fx.contexts.save(
            id,
            AuthenticationToken::authenticated(
                AuthenticationToken::password(username, ""),
                &Principal::new(username),
            ),
        );
        id
    }

    fn get_with_session(uri: &str, id: SessionId) -> Request {
        Request::builder()
            .uri(uri)
            .header(COOKIE, format!("AUTHGATE_SESSION={id}"))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathMatcher::new(["/login.html", "/health/*"]);
        assert!(matcher.matches("/login.html"));
        assert!(matcher.matches("/LOGIN.html"));
        assert!(matcher.matches("/health"));
        assert!(matcher.matches("/health/live"));
        assert!(!matcher.matches("/healthz"));
        assert!(!matcher.matches("/index"));
    }

    #[tokio::test]
    async fn test_active_session_reaches_handler() {
        let fx = fixture();
        let id = login(&fx, "mrbird");

        let response = fx
            .router
            .oneshot(get_with_session("/index", id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_anonymous_request_redirects_to_entry_point() {
        let fx = fixture();

        let response = fx
            .router
            .clone()
            .oneshot(Request::builder().uri("/index").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/authentication/require"
        );

        let response = fx
            .router
            .clone()
            .oneshot(Request::builder().uri("/admin.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login.html");

        let response = fx
            .router
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evicted_session_reported_once() {
        let fx = fixture();
        let first = login(&fx, "mrbird");
        login(&fx, "mrbird");

        let response = fx
            .router
            .clone()
            .oneshot(get_with_session("/index", first))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_some());
        assert!(fx.contexts.load(first).is_none());

        let response = fx
            .router
            .oneshot(get_with_session("/index", first))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/session/invalid");
    }

    #[tokio::test]
    async fn test_unknown_session_redirects_without_loop() {
        let fx = fixture();
        let stranger = SessionId::new();

        let response = fx
            .router
            .clone()
            .oneshot(get_with_session("/index", stranger))
            .await
            .unwrap();
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/session/invalid");

        // The invalid-session page itself is exempt; with no route it falls to 404
        let response = fx
            .router
            .oneshot(get_with_session("/session/invalid", stranger))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
