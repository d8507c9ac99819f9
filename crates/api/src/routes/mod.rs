//! API routes

pub mod auth;
pub mod health;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{authentication_pipeline, require_authentication, session_management},
    error::ApiError,
    security::{security_headers_middleware, SecurityHeaders},
    state::AppState,
};

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Create all routes.
///
/// Layers, outermost first: security headers, request tracing, session
/// management, the login pipeline, then the access rule.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    let public_routes = Router::new()
        .route(
            &config.sms_code_path,
            get(auth::send_sms_code).post(auth::send_sms_code),
        )
        .route(&config.login_page, get(auth::authentication_required))
        .route(&config.invalid_session_url, get(auth::session_invalid));

    let protected_routes = Router::new()
        .route(&config.success_redirect, get(auth::index))
        .route("/sessions", get(auth::list_sessions))
        .route("/logout", post(auth::logout))
        .route("/hello", get(auth::hello));

    let headers = SecurityHeaders::new(config.session_cookie_secure);

    Router::new()
        .merge(health_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.access_rule.clone(),
            require_authentication,
        ))
        .layer(middleware::from_fn_with_state(
            state.pipeline.clone(),
            authentication_pipeline,
        ))
        .layer(middleware::from_fn_with_state(
            state.session_management.clone(),
            session_management,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            Arc::new(headers),
            security_headers_middleware,
        ))
        .with_state(state)
}
