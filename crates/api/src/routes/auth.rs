//! Authentication routes
//!
//! Login itself is handled by the pipeline middleware; these are the routes
//! around it.

use authgate_shared::SessionId;
use axum::{
    extract::{Extension, Request, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;

use crate::{
    auth::{clear_session_cookie, LoginForm, SecurityContext, LOGIN_PURPOSE},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub mobile: String,
    pub expires_in_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: String,
    pub last_access: String,
    pub current: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Issue a login code for a mobile number and hand it to the SMS sender
pub async fn send_sms_code(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Json<SendCodeResponse>> {
    let form = LoginForm::extract(request).await;
    let mobile = form.field(&state.config.mobile_parameter);
    if mobile.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "{} must not be blank",
            state.config.mobile_parameter
        )));
    }

    let code = state.codes.issue(LOGIN_PURPOSE, &mobile);
    if let Err(e) = state.sms_sender.send(&mobile, &code).await {
        // An undeliverable code must not stay redeemable
        state.codes.invalidate(LOGIN_PURPOSE, &mobile);
        return Err(e.into());
    }

    Ok(Json(SendCodeResponse {
        mobile,
        expires_in_secs: state.codes.ttl().whole_seconds(),
    }))
}

/// Entry point target for unauthenticated requests
pub async fn authentication_required() -> (StatusCode, &'static str) {
    (
        StatusCode::UNAUTHORIZED,
        "The requested resource requires authentication",
    )
}

/// Target for requests that carried an unknown or timed-out session
pub async fn session_invalid() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": "SESSION_INVALID",
                "message": "Session is invalid or has expired; please log in again",
            }
        })),
    )
        .into_response()
}

/// The current authentication, without credentials
pub async fn index(Extension(context): Extension<SecurityContext>) -> Response {
    Json(context.authentication.view()).into_response()
}

/// Sessions held by the current principal
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    state
        .sessions
        .sessions_for(context.authentication.principal())
        .into_iter()
        .map(|record| -> ApiResult<SessionSummary> {
            Ok(SessionSummary {
                session_id: record.session_id,
                created_at: record.created_at.format(&Rfc3339).map_err(|_| ApiError::Internal)?,
                last_access: record.last_access.format(&Rfc3339).map_err(|_| ApiError::Internal)?,
                current: record.session_id == context.session_id,
            })
        })
        .collect::<ApiResult<Vec<_>>>()
        .map(Json)
}

/// Drop the current session and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
) -> Response {
    state.contexts.remove(context.session_id);
    state.sessions.remove(context.session_id);

    tracing::info!(
        principal = %context.authentication.principal(),
        session_id = %context.session_id,
        "Logged out"
    );

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(cookie) = clear_session_cookie(&state.cookie_config()) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

/// Plain greeting for authenticated callers
pub async fn hello(Extension(context): Extension<SecurityContext>) -> String {
    format!("hello, {}", context.authentication.principal())
}
