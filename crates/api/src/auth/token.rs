//! Authentication tokens
//!
//! An [`AuthenticationToken`] is the in-flight or completed authentication
//! attempt for one credential scheme. Request tokens are built by the login
//! filters; authenticated tokens can only be minted from a loaded
//! [`Principal`], which is what carries the granted authorities.

use std::collections::BTreeSet;
use std::fmt;

use authgate_shared::{Principal, Scheme, SessionId};
use serde::Serialize;

/// Scheme tag plus the raw secret it carries
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username/password login; the secret is erased after authentication
    Password { secret: String },
    /// SMS login; the code was verified before the token was built
    SmsCode,
}

impl Credentials {
    pub fn scheme(&self) -> Scheme {
        match self {
            Credentials::Password { .. } => Scheme::Password,
            Credentials::SmsCode => Scheme::SmsCode,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { .. } => f.write_str("Password { secret: [REDACTED] }"),
            Credentials::SmsCode => f.write_str("SmsCode"),
        }
    }
}

/// Request metadata attached to a token and carried over unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestDetails {
    pub remote_address: Option<String>,
    pub session_id: Option<SessionId>,
}

/// Only the crate's providers can mint an authenticated token:
///
/// ```compile_fail
/// use authgate_api::auth::AuthenticationToken;
/// use authgate_shared::Principal;
///
/// let request = AuthenticationToken::password("mrbird", "");
/// let _ = AuthenticationToken::authenticated(request, &Principal::new("mrbird"));
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticationToken {
    principal: String,
    credentials: Credentials,
    authenticated: bool,
    authorities: BTreeSet<String>,
    details: RequestDetails,
}

impl AuthenticationToken {
    /// Unauthenticated username/password request
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::unauthenticated(
            username.into(),
            Credentials::Password {
                secret: password.into(),
            },
        )
    }

    /// Unauthenticated SMS request for a mobile number
    pub fn sms_code(mobile: impl Into<String>) -> Self {
        Self::unauthenticated(mobile.into(), Credentials::SmsCode)
    }

    fn unauthenticated(principal: String, credentials: Credentials) -> Self {
        Self {
            principal,
            credentials,
            authenticated: false,
            authorities: BTreeSet::new(),
            details: RequestDetails::default(),
        }
    }

    /// Mint the authenticated form of `request` for a resolved principal.
    ///
    /// The principal's canonical username replaces whatever identifier was
    /// submitted, its authorities are copied in, and the request details are
    /// carried over unchanged.
    pub(crate) fn authenticated(request: AuthenticationToken, principal: &Principal) -> Self {
        Self {
            principal: principal.username.clone(),
            credentials: request.credentials,
            authenticated: true,
            authorities: principal.authorities.clone(),
            details: request.details,
        }
    }

    pub fn with_details(mut self, details: RequestDetails) -> Self {
        self.details = details;
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.credentials.scheme()
    }

    /// Submitted identifier before authentication, canonical username after
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Raw secret for the password scheme; empty for SMS or once erased
    pub fn secret(&self) -> &str {
        match &self.credentials {
            Credentials::Password { secret } => secret,
            Credentials::SmsCode => "",
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    pub fn details(&self) -> &RequestDetails {
        &self.details
    }

    /// Drop the raw secret, keeping the scheme tag
    pub fn erase_credentials(&mut self) {
        if let Credentials::Password { secret } = &mut self.credentials {
            secret.clear();
        }
    }

    /// Serializable view that never includes the secret
    pub fn view(&self) -> AuthenticationView<'_> {
        AuthenticationView {
            principal: &self.principal,
            scheme: self.scheme(),
            authenticated: self.authenticated,
            authorities: &self.authorities,
            details: &self.details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthenticationView<'a> {
    pub principal: &'a str,
    pub scheme: Scheme,
    pub authenticated: bool,
    pub authorities: &'a BTreeSet<String>,
    pub details: &'a RequestDetails,
}
