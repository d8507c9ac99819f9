//! Common types used across Authgate

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// HTTP session ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// =============================================================================
// Credential Schemes
// =============================================================================

/// Credential-verification method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Password,
    SmsCode,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Password => "password",
            Scheme::SmsCode => "sms_code",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Principal
// =============================================================================

/// An authenticatable identity and the authorities it is granted.
///
/// Loaded from a credential store once per authentication attempt and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Canonical identifier; sessions are counted against this value
    pub username: String,
    /// Optional alias used by the SMS scheme
    #[serde(default)]
    pub mobile: Option<String>,
    /// Encoded secret; `None` for principals that cannot use passwords
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub account_expired: bool,
    #[serde(default)]
    pub credentials_expired: bool,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

fn default_enabled() -> bool {
    true
}

impl Principal {
    /// Enabled principal with no secret and no authorities
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            mobile: None,
            password_hash: None,
            enabled: true,
            locked: false,
            account_expired: false,
            credentials_expired: false,
            authorities: BTreeSet::new(),
        }
    }

    pub fn with_mobile(mut self, mobile: impl Into<String>) -> Self {
        self.mobile = Some(mobile.into());
        self
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn with_authorities<I, A>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.authorities = authorities.into_iter().map(Into::into).collect();
        self
    }
}

/// Parse a comma separated authority list such as `"admin, user:add"`.
///
/// Blank entries are dropped.
pub fn parse_authorities(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}
