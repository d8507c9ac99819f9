//! Outcome handlers
//!
//! The pipeline never writes responses itself: success, failure and
//! expired-session outcomes are rendered by these pluggable handlers.

use authgate_shared::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use super::sessions::SessionRecord;
use super::token::AuthenticationToken;

pub trait AuthenticationSuccessHandler: Send + Sync {
    fn on_authentication_success(&self, authentication: &AuthenticationToken) -> Response;
}

pub trait AuthenticationFailureHandler: Send + Sync {
    fn on_authentication_failure(&self, error: &AuthError) -> Response;
}

/// Renders the response for a request made on a session that a newer login
/// evicted
pub trait ExpiredSessionStrategy: Send + Sync {
    fn on_expired_session_detected(&self, record: &SessionRecord) -> Response;
}

/// Redirects to a fixed landing route
#[derive(Debug, Clone)]
pub struct RedirectSuccessHandler {
    target: String,
}

impl RedirectSuccessHandler {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for RedirectSuccessHandler {
    fn default() -> Self {
        Self::new("/index")
    }
}

impl AuthenticationSuccessHandler for RedirectSuccessHandler {
    fn on_authentication_success(&self, _authentication: &AuthenticationToken) -> Response {
        Redirect::to(&self.target).into_response()
    }
}

/// Writes the error as JSON with a configurable status
#[derive(Debug, Clone, Copy)]
pub struct JsonFailureHandler {
    status: StatusCode,
}

impl JsonFailureHandler {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl Default for JsonFailureHandler {
    fn default() -> Self {
        Self::new(StatusCode::UNAUTHORIZED)
    }
}

impl AuthenticationFailureHandler for JsonFailureHandler {
    fn on_authentication_failure(&self, error: &AuthError) -> Response {
        // Lookup outages are not the caller's fault
        let status = match error {
            AuthError::CredentialLookup(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => self.status,
        };

        let body = Json(json!({
            "error": {
                "code": error.public_code(),
                "message": error.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExpiredSessionStrategy;

impl ExpiredSessionStrategy for JsonExpiredSessionStrategy {
    fn on_expired_session_detected(&self, record: &SessionRecord) -> Response {
        tracing::info!(
            principal = %record.principal,
            session_id = %record.session_id,
            "Request on evicted session"
        );

        let body = Json(json!({
            "error": {
                "code": "SESSION_EXPIRED",
                "message": "Your account has been logged in elsewhere; this session is no longer valid",
            }
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;
    use http_body_util::BodyExt;

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_success_redirects_to_landing_route() {
        let token = AuthenticationToken::password("mrbird", "");
        let response = RedirectSuccessHandler::default().on_authentication_success(&token);

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/index");
    }

    #[tokio::test]
    async fn test_failure_hides_principal_existence() {
        let handler = JsonFailureHandler::default();

        let not_found = handler.on_authentication_failure(&AuthError::PrincipalNotFound);
        assert_eq!(not_found.status(), StatusCode::UNAUTHORIZED);
        let not_found = json_body(not_found).await;

        let bad = json_body(handler.on_authentication_failure(&AuthError::BadCredentials)).await;
        assert_eq!(not_found, bad);
        assert_eq!(bad["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_failure_status_is_configurable() {
        let handler = JsonFailureHandler::new(StatusCode::INTERNAL_SERVER_ERROR);
        let response = handler.on_authentication_failure(&AuthError::CodeExpired);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "CODE_EXPIRED");
        assert_eq!(body["error"]["message"], "Verification code has expired");
    }

    #[test]
    fn test_lookup_failure_is_service_unavailable() {
        let response = JsonFailureHandler::default()
            .on_authentication_failure(&AuthError::CredentialLookup("timeout".to_string()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
