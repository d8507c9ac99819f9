//! Per-session security context
//!
//! The authenticated token for a session lives here, keyed by the id carried
//! in the session cookie. Middleware loads it into the request extensions;
//! nothing reads it from ambient state.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use authgate_shared::SessionId;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use time::{Duration, OffsetDateTime};

use super::token::AuthenticationToken;

/// Default idle timeout for stored contexts
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::minutes(30);

/// Authentication bound to a session
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub session_id: SessionId,
    pub authentication: AuthenticationToken,
    pub last_access: OffsetDateTime,
}

pub struct SecurityContextRepository {
    contexts: RwLock<HashMap<SessionId, SecurityContext>>,
    idle_timeout: Duration,
}

impl Default for SecurityContextRepository {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SecurityContextRepository {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn save(&self, session_id: SessionId, authentication: AuthenticationToken) {
        let context = SecurityContext {
            session_id,
            authentication,
            last_access: OffsetDateTime::now_utc(),
        };
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, context);
    }

    /// Load a context and mark it used
    pub fn load(&self, session_id: SessionId) -> Option<SecurityContext> {
        self.load_at(session_id, OffsetDateTime::now_utc())
    }

    /// Load as of `now`. A context idle past the timeout is dropped instead.
    pub fn load_at(&self, session_id: SessionId, now: OffsetDateTime) -> Option<SecurityContext> {
        let mut contexts = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let idle = now - contexts.get(&session_id)?.last_access > self.idle_timeout;
        if idle {
            contexts.remove(&session_id);
            tracing::debug!(session_id = %session_id, "Security context idle, dropped");
            return None;
        }

        let context = contexts.get_mut(&session_id)?;
        context.last_access = now;
        Some(context.clone())
    }

    pub fn remove(&self, session_id: SessionId) -> Option<SecurityContext> {
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id)
    }

    /// Drop every context idle past the timeout, returning their session ids
    pub fn purge_idle(&self, now: OffsetDateTime) -> Vec<SessionId> {
        let mut contexts = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let idle: Vec<SessionId> = contexts
            .values()
            .filter(|context| now - context.last_access > self.idle_timeout)
            .map(|context| context.session_id)
            .collect();
        for id in &idle {
            contexts.remove(id);
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Session cookie
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookieConfig {
    pub name: String,
    pub secure: bool,
    pub max_age: Duration,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: "AUTHGATE_SESSION".to_string(),
            secure: false,
            max_age: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// `Set-Cookie` value binding the client to `session_id`
pub fn session_cookie(
    config: &SessionCookieConfig,
    session_id: SessionId,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.name,
        config.max_age.whole_seconds()
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `Set-Cookie` value that clears the session cookie
pub fn clear_session_cookie(config: &SessionCookieConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", config.name);
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session id from the request cookies, if present and well-formed
pub fn extract_session_id(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == cookie_name)
        .and_then(|(_, value)| value.trim().parse().ok())
}
