//! Authgate API library
//!
//! Session-based login service with pluggable credential schemes (password and
//! SMS one-time code) and a per-principal concurrent-session limit.

pub mod auth;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod routes;
pub mod security;
pub mod state;

pub use config::{Config, LogFormat};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
