//! Authentication core
//!
//! Request flow: the login [`pipeline`] extracts credentials (running the
//! one-time-code pre-check from [`verification`] on the SMS route), builds an
//! [`AuthenticationToken`], and hands it to the [`AuthenticationManager`],
//! which picks a [`provider`] by scheme. A successful login is admitted into
//! the [`SessionRegistry`] and bound to a new session in the
//! [`SecurityContextRepository`]. Later requests go through [`middleware`].

pub mod context;
pub mod credentials;
pub mod handlers;
pub mod manager;
pub mod middleware;
pub mod password;
pub mod pipeline;
pub mod provider;
pub mod sessions;
pub mod token;
pub mod verification;

pub use context::{
    clear_session_cookie, extract_session_id, session_cookie, SecurityContext,
    SecurityContextRepository, SessionCookieConfig,
};
pub use credentials::{CredentialStore, CredentialStoreError, InMemoryCredentialStore};
pub use handlers::{
    AuthenticationFailureHandler, AuthenticationSuccessHandler, ExpiredSessionStrategy,
    JsonExpiredSessionStrategy, JsonFailureHandler, RedirectSuccessHandler,
};
pub use manager::AuthenticationManager;
pub use middleware::{require_authentication, session_management, AccessRule, PathMatcher, SessionManagement};
pub use password::{
    generate_impossible_hash, hash_password, verify_password, Argon2PasswordEncoder,
    PasswordEncoder, PasswordError, PlainTextPasswordEncoder,
};
pub use pipeline::{
    authentication_pipeline, AuthenticationFilter, AuthenticationPipeline, LoginForm,
    PasswordLoginFilter, RouteGuard, SmsCodeLoginFilter,
};
pub use provider::{
    AuthenticationProvider, PasswordAuthenticationProvider, SmsCodeAuthenticationProvider,
};
pub use sessions::{
    Admission, LoggingEvictionListener, SessionEvictionListener, SessionPolicy, SessionRecord,
    SessionRegistry, SessionStatus,
};
pub use token::{AuthenticationToken, Credentials, RequestDetails};
pub use verification::{
    LoggingSmsSender, SmsError, SmsSender, VerificationCode, VerificationCodeStore, LOGIN_PURPOSE,
};
