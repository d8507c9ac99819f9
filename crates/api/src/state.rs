//! Application state

use std::sync::Arc;

use time::Duration;

use crate::auth::{
    AccessRule, AuthenticationManager, AuthenticationPipeline, CredentialStore,
    JsonFailureHandler, LoggingEvictionListener, PasswordAuthenticationProvider, PasswordEncoder,
    PasswordLoginFilter, PathMatcher, RedirectSuccessHandler, RouteGuard,
    SecurityContextRepository, SessionCookieConfig, SessionEvictionListener, SessionManagement,
    SessionPolicy, SessionRegistry, SmsCodeAuthenticationProvider, SmsCodeLoginFilter, SmsSender,
    VerificationCodeStore,
};
use crate::config::Config;

/// Shared state handed to every route and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub codes: Arc<VerificationCodeStore>,
    pub sessions: Arc<SessionRegistry>,
    pub contexts: Arc<SecurityContextRepository>,
    pub sms_sender: Arc<dyn SmsSender>,
    pub pipeline: Arc<AuthenticationPipeline>,
    pub session_management: Arc<SessionManagement>,
    pub access_rule: Arc<AccessRule>,
}

impl AppState {
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        encoder: Arc<dyn PasswordEncoder>,
        sms_sender: Arc<dyn SmsSender>,
    ) -> Self {
        Self::with_eviction_listener(config, credentials, encoder, sms_sender, LoggingEvictionListener)
    }

    /// Assemble the pipeline, registries and middleware state from `config`
    pub fn with_eviction_listener(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        encoder: Arc<dyn PasswordEncoder>,
        sms_sender: Arc<dyn SmsSender>,
        listener: impl SessionEvictionListener + 'static,
    ) -> Self {
        let idle_timeout = Duration::seconds(config.session_idle_timeout_secs);

        let codes = Arc::new(VerificationCodeStore::new(
            Duration::seconds(config.sms_code_ttl_secs),
            config.sms_code_length,
        ));
        let sessions = Arc::new(SessionRegistry::with_listener(
            SessionPolicy {
                max_sessions: config.max_sessions,
                prevent_login_when_full: config.prevent_login_when_full,
            },
            listener,
        ));
        let contexts = Arc::new(SecurityContextRepository::new(idle_timeout));
        let cookie = SessionCookieConfig {
            name: config.session_cookie_name.clone(),
            secure: config.session_cookie_secure,
            max_age: idle_timeout,
        };

        let manager = AuthenticationManager::default()
            .with_provider(Arc::new(PasswordAuthenticationProvider::new(
                credentials.clone(),
                encoder,
            )))
            .with_provider(Arc::new(SmsCodeAuthenticationProvider::new(credentials)));

        let pipeline = AuthenticationPipeline::new(manager, sessions.clone(), contexts.clone())
            .with_filter(Arc::new(
                PasswordLoginFilter::new(RouteGuard::post(config.login_path.clone()))
                    .with_parameters(
                        config.username_parameter.clone(),
                        config.password_parameter.clone(),
                    ),
            ))
            .with_filter(Arc::new(
                SmsCodeLoginFilter::new(
                    RouteGuard::post(config.sms_login_path.clone()),
                    codes.clone(),
                )
                .with_parameters(
                    config.mobile_parameter.clone(),
                    config.sms_code_parameter.clone(),
                ),
            ))
            .with_success_handler(Arc::new(RedirectSuccessHandler::new(
                config.success_redirect.clone(),
            )))
            .with_failure_handler(Arc::new(JsonFailureHandler::new(config.failure_status)))
            .with_cookie(cookie.clone())
            .post_only(config.post_only);

        let public_paths = PathMatcher::new([
            config.login_path.clone(),
            config.sms_login_path.clone(),
            config.sms_code_path.clone(),
            config.login_page.clone(),
            config.login_form_page.clone(),
            config.invalid_session_url.clone(),
            "/health/*".to_string(),
        ]);

        let session_management = SessionManagement::new(
            sessions.clone(),
            contexts.clone(),
            cookie,
            config.invalid_session_url.clone(),
        )
        .with_exempt(public_paths.clone());

        let access_rule = AccessRule::new(
            public_paths,
            config.login_page.clone(),
            config.login_form_page.clone(),
        );

        Self {
            config: Arc::new(config),
            codes,
            sessions,
            contexts,
            sms_sender,
            pipeline: Arc::new(pipeline),
            session_management: Arc::new(session_management),
            access_rule: Arc::new(access_rule),
        }
    }

    pub fn cookie_config(&self) -> SessionCookieConfig {
        SessionCookieConfig {
            name: self.config.session_cookie_name.clone(),
            secure: self.config.session_cookie_secure,
            max_age: self.contexts.idle_timeout(),
        }
    }
}
