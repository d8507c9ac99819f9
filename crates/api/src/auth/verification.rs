//! One-time verification codes
//!
//! Codes are keyed by (purpose, identifier), live for a fixed TTL, and are
//! single-use: a successful check removes the code, as does a check that finds
//! it expired. A newer issuance for the same key overwrites the older code.
//!
//! All operations on the store run under one mutex, so an `issue` and a `check`
//! for the same key can never interleave.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use authgate_shared::AuthError;
use rand::Rng;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

/// Purpose used by the SMS login flow
pub const LOGIN_PURPOSE: &str = "login";

/// Default code lifetime
pub const DEFAULT_CODE_TTL: Duration = Duration::seconds(60);

/// Default number of digits
pub const DEFAULT_CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    code: String,
    issued_at: OffsetDateTime,
    ttl: Duration,
}

impl VerificationCode {
    pub fn new(code: impl Into<String>, issued_at: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            code: code.into(),
            issued_at,
            ttl,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn issued_at(&self) -> OffsetDateTime {
        self.issued_at
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.issued_at + self.ttl
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at()
    }

    /// Case-insensitive, constant-time comparison
    fn matches(&self, supplied: &str) -> bool {
        let stored = self.code.to_ascii_lowercase();
        let supplied = supplied.to_ascii_lowercase();
        stored.as_bytes().ct_eq(supplied.as_bytes()).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CodeKey {
    purpose: String,
    identifier: String,
}

impl CodeKey {
    fn new(purpose: &str, identifier: &str) -> Self {
        Self {
            purpose: purpose.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

pub struct VerificationCodeStore {
    codes: Mutex<HashMap<CodeKey, VerificationCode>>,
    ttl: Duration,
    length: usize,
}

impl Default for VerificationCodeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_TTL, DEFAULT_CODE_LENGTH)
    }
}

impl VerificationCodeStore {
    pub fn new(ttl: Duration, length: usize) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            ttl,
            length,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a numeric code of the configured length
    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    /// Issue a fresh random code, replacing any code already stored for the key
    pub fn issue(&self, purpose: &str, identifier: &str) -> String {
        let code = self.generate_code();
        self.store(purpose, identifier, &code, OffsetDateTime::now_utc());
        code
    }

    /// Store a caller-chosen code issued at `issued_at`
    pub fn store(&self, purpose: &str, identifier: &str, code: &str, issued_at: OffsetDateTime) {
        let entry = VerificationCode::new(code, issued_at, self.ttl);
        let expires_at = entry.expires_at();

        let replaced = self
            .codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(CodeKey::new(purpose, identifier), entry)
            .is_some();

        tracing::info!(
            purpose = %purpose,
            identifier = %identifier,
            expires_at = %expires_at,
            replaced,
            "Verification code issued"
        );
    }

    /// Check a submitted code against the current time
    pub fn check(&self, purpose: &str, identifier: &str, supplied: &str) -> Result<(), AuthError> {
        self.check_at(purpose, identifier, supplied, OffsetDateTime::now_utc())
    }

    /// Check a submitted code as of `now`.
    ///
    /// Order of evaluation: blank submission, missing code, expiry (which
    /// deletes the code), mismatch (which leaves it in place), match (which
    /// consumes it).
    pub fn check_at(
        &self,
        purpose: &str,
        identifier: &str,
        supplied: &str,
        now: OffsetDateTime,
    ) -> Result<(), AuthError> {
        if supplied.trim().is_empty() {
            return Err(AuthError::CodeBlank);
        }

        let key = CodeKey::new(purpose, identifier);
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(stored) = codes.get(&key) else {
            return Err(AuthError::CodeMissing);
        };

        if stored.is_expired_at(now) {
            codes.remove(&key);
            tracing::info!(
                purpose = %purpose,
                identifier = %identifier,
                "Verification code expired and removed"
            );
            return Err(AuthError::CodeExpired);
        }

        if !stored.matches(supplied.trim()) {
            tracing::debug!(
                purpose = %purpose,
                identifier = %identifier,
                "Verification code mismatch"
            );
            return Err(AuthError::CodeMismatch);
        }

        codes.remove(&key);
        tracing::info!(
            purpose = %purpose,
            identifier = %identifier,
            "Verification code consumed"
        );
        Ok(())
    }

    /// Drop a code without checking it
    pub fn invalidate(&self, purpose: &str, identifier: &str) -> bool {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&CodeKey::new(purpose, identifier))
            .is_some()
    }

    /// Remove every code that has expired as of `now`
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        let before = codes.len();
        codes.retain(|_, code| !code.is_expired_at(now));
        let purged = before - codes.len();

        if purged > 0 {
            tracing::info!(count = purged, "Purged expired verification codes");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("SMS delivery failed: {0}")]
    Delivery(String),
}

/// Out-of-band delivery of a freshly issued code
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, mobile: &str, code: &str) -> Result<(), SmsError>;
}

/// Development sender that writes the code to the log instead of a carrier
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSmsSender;

#[async_trait]
impl SmsSender for LoggingSmsSender {
    async fn send(&self, mobile: &str, code: &str) -> Result<(), SmsError> {
        tracing::debug!(mobile = %mobile, code = %code, "SMS verification code (not delivered)");
        Ok(())
    }
}
