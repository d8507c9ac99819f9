//! Concurrent-session registry
//!
//! Tracks which sessions each principal holds and enforces the per-principal
//! limit at login time. When the limit is reached the registry either rejects
//! the new login or evicts the oldest session (FIFO), depending on
//! [`SessionPolicy::prevent_login_when_full`].
//!
//! Locking: admissions and removals for one principal are serialized by that
//! principal's own mutex; the global maps are only held for short lookups.
//! Lock order is always principal slot, then index.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use authgate_shared::{AuthError, SessionId};
use time::OffsetDateTime;

/// Admission policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Concurrent sessions allowed per principal; at least 1
    pub max_sessions: usize,
    /// Reject the new login instead of evicting the oldest session
    pub prevent_login_when_full: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_sessions: 1,
            prevent_login_when_full: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub principal: String,
    pub session_id: SessionId,
    pub created_at: OffsetDateTime,
    pub last_access: OffsetDateTime,
    /// Set when evicted; the record stays until the next request on that
    /// session observes it
    pub expired: bool,
}

impl SessionRecord {
    fn new(principal: &str, session_id: SessionId, now: OffsetDateTime) -> Self {
        Self {
            principal: principal.to_string(),
            session_id,
            created_at: now,
            last_access: now,
            expired: false,
        }
    }
}

/// What the registry knows about a session id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Expired,
    Unknown,
}

/// Result of a successful admission
#[derive(Debug, Default)]
pub struct Admission {
    /// Sessions marked expired to make room, oldest first
    pub evicted: Vec<SessionRecord>,
}

/// Notified synchronously for each eviction, before `admit` returns
pub trait SessionEvictionListener: Send + Sync {
    fn on_session_evicted(&self, record: &SessionRecord);
}

impl<F> SessionEvictionListener for F
where
    F: Fn(&SessionRecord) + Send + Sync,
{
    fn on_session_evicted(&self, record: &SessionRecord) {
        self(record)
    }
}

/// Default listener; records the eviction in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEvictionListener;

impl SessionEvictionListener for LoggingEvictionListener {
    fn on_session_evicted(&self, record: &SessionRecord) {
        tracing::info!(
            principal = %record.principal,
            session_id = %record.session_id,
            "Session evicted by a newer login"
        );
    }
}

type PrincipalSlot = Arc<Mutex<VecDeque<SessionId>>>;

pub struct SessionRegistry {
    policy: SessionPolicy,
    /// principal -> active session ids, oldest first
    principals: RwLock<HashMap<String, PrincipalSlot>>,
    index: RwLock<HashMap<SessionId, SessionRecord>>,
    listener: Box<dyn SessionEvictionListener>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}

impl SessionRegistry {
    pub fn new(policy: SessionPolicy) -> Self {
        Self::with_listener(policy, LoggingEvictionListener)
    }

    pub fn with_listener(policy: SessionPolicy, listener: impl SessionEvictionListener + 'static) -> Self {
        Self {
            policy: SessionPolicy {
                max_sessions: policy.max_sessions.max(1),
                ..policy
            },
            principals: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            listener: Box::new(listener),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn slot(&self, principal: &str) -> PrincipalSlot {
        if let Some(slot) = self
            .principals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal)
        {
            return Arc::clone(slot);
        }

        let mut principals = self
            .principals
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(principals.entry(principal.to_string()).or_default())
    }

    /// Register `session_id` for `principal`.
    ///
    /// Re-admitting a session the principal already holds only refreshes it.
    /// Evicted sessions are reported to the listener after every lock is
    /// released.
    pub fn admit(&self, principal: &str, session_id: SessionId) -> Result<Admission, AuthError> {
        self.admit_replacing_at(principal, session_id, None, OffsetDateTime::now_utc())
    }

    pub fn admit_at(
        &self,
        principal: &str,
        session_id: SessionId,
        now: OffsetDateTime,
    ) -> Result<Admission, AuthError> {
        self.admit_replacing_at(principal, session_id, None, now)
    }

    /// Register `session_id` in place of `replaced`.
    ///
    /// When `replaced` is one of the principal's own active sessions it does
    /// not count against the limit and is dropped on success. A rejected
    /// admission changes nothing.
    pub fn admit_replacing(
        &self,
        principal: &str,
        session_id: SessionId,
        replaced: Option<SessionId>,
    ) -> Result<Admission, AuthError> {
        self.admit_replacing_at(principal, session_id, replaced, OffsetDateTime::now_utc())
    }

    pub fn admit_replacing_at(
        &self,
        principal: &str,
        session_id: SessionId,
        replaced: Option<SessionId>,
        now: OffsetDateTime,
    ) -> Result<Admission, AuthError> {
        let slot = self.slot(principal);
        let mut admission = Admission::default();

        {
            let mut active = slot.lock().unwrap_or_else(PoisonError::into_inner);

            if active.contains(&session_id) {
                self.touch(session_id, now);
                return Ok(admission);
            }

            let replaced = replaced.filter(|id| *id != session_id && active.contains(id));
            let held = active.len() - usize::from(replaced.is_some());

            if held >= self.policy.max_sessions && self.policy.prevent_login_when_full {
                tracing::warn!(
                    principal = %principal,
                    max_sessions = self.policy.max_sessions,
                    "Login rejected: maximum sessions reached"
                );
                return Err(AuthError::SessionRejected);
            }

            let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);

            if let Some(replaced) = replaced {
                active.retain(|id| *id != replaced);
                index.remove(&replaced);
            }

            while active.len() >= self.policy.max_sessions {
                let Some(oldest) = active.pop_front() else {
                    break;
                };
                if let Some(record) = index.get_mut(&oldest) {
                    record.expired = true;
                    admission.evicted.push(record.clone());
                }
            }

            active.push_back(session_id);
            index.insert(session_id, SessionRecord::new(principal, session_id, now));
        }

        tracing::debug!(
            principal = %principal,
            session_id = %session_id,
            evicted = admission.evicted.len(),
            "Session admitted"
        );

        for record in &admission.evicted {
            self.listener.on_session_evicted(record);
        }

        Ok(admission)
    }

    fn touch(&self, session_id: SessionId, now: OffsetDateTime) -> bool {
        match self
            .index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&session_id)
        {
            Some(record) if !record.expired => {
                record.last_access = now;
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, session_id: SessionId) -> SessionStatus {
        match self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
        {
            Some(record) if record.expired => SessionStatus::Expired,
            Some(_) => SessionStatus::Active,
            None => SessionStatus::Unknown,
        }
    }

    pub fn record(&self, session_id: SessionId) -> Option<SessionRecord> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned()
    }

    /// Remove and return an evicted record.
    ///
    /// Only one caller can take a given record, so the expired-session
    /// response fires once.
    pub fn take_expired(&self, session_id: SessionId) -> Option<SessionRecord> {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        match index.get(&session_id) {
            Some(record) if record.expired => index.remove(&session_id),
            _ => None,
        }
    }

    /// Update last access for an active session
    pub fn refresh(&self, session_id: SessionId, now: OffsetDateTime) -> bool {
        self.touch(session_id, now)
    }

    /// Forget a session entirely (logout, idle timeout, re-login)
    pub fn remove(&self, session_id: SessionId) -> Option<SessionRecord> {
        let principal = self.record(session_id)?.principal;
        let slot = self.slot(&principal);

        let removed = {
            let mut active = slot.lock().unwrap_or_else(PoisonError::into_inner);
            active.retain(|id| *id != session_id);
            self.index
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&session_id)
        };

        self.release_slot(&principal, slot);
        removed
    }

    /// Drop a principal's slot once nothing references it
    fn release_slot(&self, principal: &str, slot: PrincipalSlot) {
        drop(slot);
        let mut principals = self
            .principals
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let unused = principals.get(principal).is_some_and(|slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_empty()
        });
        if unused {
            principals.remove(principal);
        }
    }

    /// Active sessions for a principal, oldest first
    pub fn sessions_for(&self, principal: &str) -> Vec<SessionRecord> {
        let Some(slot) = self
            .principals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal)
            .cloned()
        else {
            return Vec::new();
        };

        let active = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        active
            .iter()
            .filter_map(|id| index.get(id).cloned())
            .collect()
    }

    /// Drop evicted records that were never observed, if they were last used
    /// before `cutoff`
    pub fn purge_expired_before(&self, cutoff: OffsetDateTime) -> usize {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let before = index.len();
        index.retain(|_, record| !(record.expired && record.last_access < cutoff));
        before - index.len()
    }

    /// Number of principals holding at least one session
    pub fn principal_count(&self) -> usize {
        self.principals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of records, active and expired
    pub fn session_count(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn policy(max_sessions: usize, prevent_login_when_full: bool) -> SessionPolicy {
        SessionPolicy {
            max_sessions,
            prevent_login_when_full,
        }
    }

    #[test]
    fn test_evicts_oldest_and_notifies() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let registry = SessionRegistry::with_listener(policy(1, false), move |r: &SessionRecord| {
            sink.lock().unwrap().push(r.session_id);
        });

        let a = SessionId::new();
        let b = SessionId::new();
        registry.admit("mrbird", a).unwrap();
        let admission = registry.admit("mrbird", b).unwrap();

        assert_eq!(admission.evicted.len(), 1);
        assert_eq!(admission.evicted[0].session_id, a);
        assert_eq!(*evicted.lock().unwrap(), vec![a]);
        assert_eq!(registry.status(a), SessionStatus::Expired);
        assert_eq!(registry.status(b), SessionStatus::Active);

        let active: Vec<_> = registry
            .sessions_for("mrbird")
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(active, vec![b]);
    }

    #[test]
    fn test_rejects_when_full() {
        let registry = SessionRegistry::new(policy(1, true));
        let a = SessionId::new();
        let b = SessionId::new();

        registry.admit("mrbird", a).unwrap();
        assert_eq!(registry.admit("mrbird", b).unwrap_err(), AuthError::SessionRejected);
        assert_eq!(registry.status(a), SessionStatus::Active);
        assert_eq!(registry.status(b), SessionStatus::Unknown);
    }

    #[test]
    fn test_limit_is_per_principal() {
        let registry = SessionRegistry::new(policy(1, true));
        registry.admit("mrbird", SessionId::new()).unwrap();
        registry.admit("scott", SessionId::new()).unwrap();
        assert_eq!(registry.principal_count(), 2);
    }

    #[test]
    fn test_fifo_with_larger_limit() {
        let registry = SessionRegistry::new(policy(2, false));
        let ids: Vec<_> = (0..3).map(|_| SessionId::new()).collect();
        for id in &ids {
            registry.admit("mrbird", *id).unwrap();
        }

        assert_eq!(registry.status(ids[0]), SessionStatus::Expired);
        assert_eq!(registry.status(ids[1]), SessionStatus::Active);
        assert_eq!(registry.status(ids[2]), SessionStatus::Active);
        assert_eq!(registry.sessions_for("mrbird").len(), 2);
    }

    #[test]
    fn test_readmitting_same_session_does_not_evict() {
        let registry = SessionRegistry::new(policy(1, true));
        let a = SessionId::new();
        registry.admit("mrbird", a).unwrap();
        let admission = registry.admit("mrbird", a).unwrap();
        assert!(admission.evicted.is_empty());
        assert_eq!(registry.status(a), SessionStatus::Active);
    }

    #[test]
    fn test_replacing_own_session_when_full() {
        let registry = SessionRegistry::new(policy(1, true));
        let a = SessionId::new();
        let b = SessionId::new();
        registry.admit("mrbird", a).unwrap();

        let admission = registry.admit_replacing("mrbird", b, Some(a)).unwrap();
        assert!(admission.evicted.is_empty());
        assert_eq!(registry.status(a), SessionStatus::Unknown);
        assert_eq!(registry.status(b), SessionStatus::Active);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_rejected_replacement_keeps_other_principal_session() {
        let registry = SessionRegistry::new(policy(1, true));
        let held = SessionId::new();
        let other = SessionId::new();
        registry.admit("mrbird", held).unwrap();
        registry.admit("scott", other).unwrap();

        let result = registry.admit_replacing("mrbird", SessionId::new(), Some(other));
        assert_eq!(result.unwrap_err(), AuthError::SessionRejected);
        assert_eq!(registry.status(held), SessionStatus::Active);
        assert_eq!(registry.status(other), SessionStatus::Active);
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn test_take_expired_fires_once() {
        let registry = SessionRegistry::new(policy(1, false));
        let a = SessionId::new();
        registry.admit("mrbird", a).unwrap();
        // Active sessions are never taken
        assert!(registry.take_expired(a).is_none());

        registry.admit("mrbird", SessionId::new()).unwrap();
        assert!(registry.take_expired(a).is_some());
        assert!(registry.take_expired(a).is_none());
        assert_eq!(registry.status(a), SessionStatus::Unknown);
    }

    #[test]
    fn test_remove_frees_capacity_and_slot() {
        let registry = SessionRegistry::new(policy(1, true));
        let a = SessionId::new();
        registry.admit("mrbird", a).unwrap();

        assert!(registry.remove(a).is_some());
        assert_eq!(registry.principal_count(), 0);
        assert_eq!(registry.session_count(), 0);
        registry.admit("mrbird", SessionId::new()).unwrap();
    }

    #[test]
    fn test_refresh_and_purge() {
        let registry = SessionRegistry::new(policy(1, false));
        let start = OffsetDateTime::now_utc();
        let a = SessionId::new();
        let b = SessionId::new();

        registry.admit_at("mrbird", a, start).unwrap();
        let later = start + time::Duration::minutes(5);
        assert!(registry.refresh(a, later));
        assert_eq!(registry.record(a).unwrap().last_access, later);

        registry.admit_at("mrbird", b, later).unwrap();
        // Evicted sessions cannot be refreshed
        assert!(!registry.refresh(a, later));

        assert_eq!(registry.purge_expired_before(later), 0);
        assert_eq!(registry.purge_expired_before(later + time::Duration::seconds(1)), 1);
        assert_eq!(registry.status(a), SessionStatus::Unknown);
        assert_eq!(registry.status(b), SessionStatus::Active);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let registry = SessionRegistry::new(policy(0, false));
        assert_eq!(registry.policy().max_sessions, 1);
    }

    #[test]
    fn test_concurrent_admissions_respect_limit() {
        let registry = Arc::new(SessionRegistry::new(policy(2, true)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.admit("mrbird", SessionId::new()).is_ok())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 2);
        assert_eq!(registry.sessions_for("mrbird").len(), 2);
    }
}
