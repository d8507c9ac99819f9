//! Authentication error taxonomy

use thiserror::Error;

/// Every way an authentication attempt can fail.
///
/// All variants are terminal for the request that produced them. The
/// distinction between [`AuthError::PrincipalNotFound`] and
/// [`AuthError::BadCredentials`] is kept for logging and tests only;
/// [`AuthError::public_message`] collapses them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    // Dispatch
    #[error("No authentication provider supports the {0} scheme")]
    UnsupportedScheme(String),
    #[error("Authentication method not supported: {0}")]
    MethodNotSupported(String),

    // Principal resolution
    #[error("No principal found for the supplied identifier")]
    PrincipalNotFound,
    #[error("Bad credentials")]
    BadCredentials,
    #[error("Credential lookup failed: {0}")]
    CredentialLookup(String),

    // Account status
    #[error("User account is disabled")]
    AccountDisabled,
    #[error("User account is locked")]
    AccountLocked,
    #[error("User account has expired")]
    AccountExpired,
    #[error("User credentials have expired")]
    CredentialsExpired,

    // Verification codes
    #[error("Verification code must not be blank")]
    CodeBlank,
    #[error("Verification code does not exist")]
    CodeMissing,
    #[error("Verification code has expired")]
    CodeExpired,
    #[error("Verification code is incorrect")]
    CodeMismatch,

    // Session admission
    #[error("Maximum sessions for this principal exceeded")]
    SessionRejected,
}

impl AuthError {
    /// Stable machine-readable code for responses and log fields
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UnsupportedScheme(_) => "UNSUPPORTED_SCHEME",
            AuthError::MethodNotSupported(_) => "METHOD_NOT_SUPPORTED",
            AuthError::PrincipalNotFound => "PRINCIPAL_NOT_FOUND",
            AuthError::BadCredentials => "BAD_CREDENTIALS",
            AuthError::CredentialLookup(_) => "CREDENTIAL_LOOKUP_FAILED",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::AccountLocked => "ACCOUNT_LOCKED",
            AuthError::AccountExpired => "ACCOUNT_EXPIRED",
            AuthError::CredentialsExpired => "CREDENTIALS_EXPIRED",
            AuthError::CodeBlank => "CODE_BLANK",
            AuthError::CodeMissing => "CODE_MISSING",
            AuthError::CodeExpired => "CODE_EXPIRED",
            AuthError::CodeMismatch => "CODE_MISMATCH",
            AuthError::SessionRejected => "SESSION_REJECTED",
        }
    }

    /// Code exposed to clients. Unknown principals and wrong secrets share one
    /// code so responses cannot be used to enumerate accounts.
    pub fn public_code(&self) -> &'static str {
        match self {
            AuthError::PrincipalNotFound | AuthError::BadCredentials => "INVALID_CREDENTIALS",
            AuthError::CredentialLookup(_) => "AUTHENTICATION_SERVICE_ERROR",
            other => other.code(),
        }
    }

    /// Message exposed to clients
    pub fn public_message(&self) -> String {
        match self {
            AuthError::PrincipalNotFound | AuthError::BadCredentials => {
                "Invalid credentials".to_string()
            }
            AuthError::CredentialLookup(_) => {
                "Authentication service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_safe_public_messages() {
        assert_eq!(
            AuthError::PrincipalNotFound.public_message(),
            AuthError::BadCredentials.public_message()
        );
        assert_eq!(
            AuthError::PrincipalNotFound.public_code(),
            AuthError::BadCredentials.public_code()
        );

        // Internal codes stay distinct
        assert_ne!(
            AuthError::PrincipalNotFound.code(),
            AuthError::BadCredentials.code()
        );
    }

    #[test]
    fn test_lookup_failure_hides_detail() {
        let err = AuthError::CredentialLookup("connection refused".to_string());
        assert!(!err.public_message().contains("connection refused"));
        assert!(err.to_string().contains("connection refused"));
    }
}
