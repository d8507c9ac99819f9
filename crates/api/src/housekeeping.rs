//! Periodic cleanup of the in-memory registries

use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// Counts from one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_codes: usize,
    pub idle_sessions: usize,
    pub abandoned_evictions: usize,
}

/// Purge expired codes, idle sessions and evicted records nobody came back for
pub fn sweep_once(state: &AppState, now: OffsetDateTime) -> SweepReport {
    let expired_codes = state.codes.purge_expired(now);

    let idle = state.contexts.purge_idle(now);
    for session_id in &idle {
        state.sessions.remove(*session_id);
    }

    // An evicted session is kept until its owner's next request; give up once
    // it has been idle as long as a live session would be allowed to be
    let abandoned_evictions = state
        .sessions
        .purge_expired_before(now - state.contexts.idle_timeout());

    SweepReport {
        expired_codes,
        idle_sessions: idle.len(),
        abandoned_evictions,
    }
}

/// Background task running [`sweep_once`] every `interval`
pub async fn sweeper_task(state: AppState, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        let report = sweep_once(&state, OffsetDateTime::now_utc());
        if report != SweepReport::default() {
            tracing::info!(
                expired_codes = report.expired_codes,
                idle_sessions = report.idle_sessions,
                abandoned_evictions = report.abandoned_evictions,
                "Housekeeping sweep"
            );
        }
    }
}

pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.sweep_interval_secs);
    tokio::spawn(sweeper_task(state, interval))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{
        AuthenticationToken, InMemoryCredentialStore, LoggingSmsSender, PlainTextPasswordEncoder,
        SessionStatus, LOGIN_PURPOSE,
    };
    use crate::config::Config;
    use authgate_shared::{Principal, SessionId};
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(
            Config::default(),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(PlainTextPasswordEncoder),
            Arc::new(LoggingSmsSender),
        )
    }

    fn bind(state: &AppState, username: &str) -> SessionId {
        let id = SessionId::new();
        state.sessions.admit(username, id).unwrap();
        state.contexts.save(
            id,
            AuthenticationToken::authenticated(
                AuthenticationToken::password(username, ""),
                &Principal::new(username),
            ),
        );
        id
    }

    #[test]
    fn test_sweep_purges_everything_stale() {
        let state = state();
        let now = OffsetDateTime::now_utc();

        state
            .codes
            .store(LOGIN_PURPOSE, "+1555", "482913", now - time::Duration::minutes(5));
        let evicted = bind(&state, "mrbird");
        let live = bind(&state, "mrbird");
        assert_eq!(state.sessions.status(evicted), SessionStatus::Expired);

        // Nothing is stale yet apart from the code
        let report = sweep_once(&state, now);
        assert_eq!(
            report,
            SweepReport {
                expired_codes: 1,
                ..SweepReport::default()
            }
        );

        let much_later = now + time::Duration::hours(2);
        let report = sweep_once(&state, much_later);
        assert_eq!(report.idle_sessions, 2);
        assert_eq!(report.abandoned_evictions, 0);
        assert_eq!(state.sessions.status(live), SessionStatus::Unknown);
        assert_eq!(state.sessions.status(evicted), SessionStatus::Unknown);
        assert_eq!(state.sessions.principal_count(), 0);
    }

    #[test]
    fn test_sweep_drops_abandoned_evictions() {
        let state = state();
        let now = OffsetDateTime::now_utc();

        let evicted = bind(&state, "mrbird");
        state.contexts.remove(evicted);
        bind(&state, "mrbird");

        let report = sweep_once(&state, now + time::Duration::hours(1));
        assert_eq!(report.abandoned_evictions, 1);
        assert_eq!(state.sessions.status(evicted), SessionStatus::Unknown);
    }
}
