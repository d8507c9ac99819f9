//! Authentication providers
//!
//! A provider turns an unauthenticated [`AuthenticationToken`] for one scheme
//! into an authenticated one. Credential verification (what proves identity)
//! is separate from principal resolution (which authorities that identity
//! gets), so a new scheme only needs a new provider.

use std::sync::Arc;

use async_trait::async_trait;
use authgate_shared::{AuthError, Principal, Scheme};

use super::credentials::CredentialStore;
use super::password::{generate_impossible_hash, PasswordEncoder};
use super::token::AuthenticationToken;

#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    fn supports(&self, scheme: Scheme) -> bool;

    async fn authenticate(
        &self,
        token: AuthenticationToken,
    ) -> Result<AuthenticationToken, AuthError>;
}

/// Resolve the token's identifier through the credential store
async fn load_principal(
    store: &dyn CredentialStore,
    identifier: &str,
) -> Result<Option<Principal>, AuthError> {
    store.lookup(identifier).await.map_err(|e| {
        tracing::error!(error = %e, "Credential store lookup failed");
        AuthError::CredentialLookup(e.to_string())
    })
}

/// Status checks that run before any secret comparison
pub fn check_account_status(principal: &Principal) -> Result<(), AuthError> {
    if principal.locked {
        return Err(AuthError::AccountLocked);
    }
    if !principal.enabled {
        return Err(AuthError::AccountDisabled);
    }
    if principal.account_expired {
        return Err(AuthError::AccountExpired);
    }
    Ok(())
}

// =============================================================================
// Password
// =============================================================================

/// Username/password provider
pub struct PasswordAuthenticationProvider {
    store: Arc<dyn CredentialStore>,
    encoder: Arc<dyn PasswordEncoder>,
    /// Compared against when the principal is unknown
    timing_hash: Option<String>,
}

impl PasswordAuthenticationProvider {
    pub fn new(store: Arc<dyn CredentialStore>, encoder: Arc<dyn PasswordEncoder>) -> Self {
        let timing_hash = match generate_impossible_hash(encoder.as_ref()) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Could not prepare timing-equalisation hash");
                None
            }
        };

        Self {
            store,
            encoder,
            timing_hash,
        }
    }
}

#[async_trait]
impl AuthenticationProvider for PasswordAuthenticationProvider {
    fn supports(&self, scheme: Scheme) -> bool {
        scheme == Scheme::Password
    }

    async fn authenticate(
        &self,
        token: AuthenticationToken,
    ) -> Result<AuthenticationToken, AuthError> {
        let Some(principal) = load_principal(self.store.as_ref(), token.principal()).await? else {
            if let Some(hash) = &self.timing_hash {
                let _ = self.encoder.matches(token.secret(), hash);
            }
            return Err(AuthError::PrincipalNotFound);
        };

        check_account_status(&principal)?;

        let matched = principal
            .password_hash
            .as_deref()
            .map(|stored| self.encoder.matches(token.secret(), stored))
            .unwrap_or(false);
        if !matched {
            return Err(AuthError::BadCredentials);
        }

        if principal.credentials_expired {
            return Err(AuthError::CredentialsExpired);
        }

        Ok(AuthenticationToken::authenticated(token, &principal))
    }
}

// =============================================================================
// SMS code
// =============================================================================

/// Mobile-number provider.
///
/// The one-time code has already been checked by the login filter before the
/// token exists, so this only resolves the principal.
pub struct SmsCodeAuthenticationProvider {
    store: Arc<dyn CredentialStore>,
}

impl SmsCodeAuthenticationProvider {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthenticationProvider for SmsCodeAuthenticationProvider {
    fn supports(&self, scheme: Scheme) -> bool {
        scheme == Scheme::SmsCode
    }

    async fn authenticate(
        &self,
        token: AuthenticationToken,
    ) -> Result<AuthenticationToken, AuthError> {
        let principal = load_principal(self.store.as_ref(), token.principal())
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        check_account_status(&principal)?;

        Ok(AuthenticationToken::authenticated(token, &principal))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::credentials::{CredentialStoreError, InMemoryCredentialStore};
    use crate::auth::password::PlainTextPasswordEncoder;

    fn store() -> Arc<dyn CredentialStore> {
        Arc::new(
            InMemoryCredentialStore::with_principals([
                Principal::new("mrbird")
                    .with_mobile("+1555")
                    .with_password_hash("123456")
                    .with_authorities(["admin", "user:add"]),
                Principal {
                    locked: true,
                    ..Principal::new("locked")
                        .with_password_hash("123456")
                        .with_authorities(["admin"])
                },
                Principal {
                    credentials_expired: true,
                    ..Principal::new("stale").with_password_hash("123456")
                },
                Principal::new("oauth-only").with_authorities(["user"]),
            ])
            .unwrap(),
        )
    }

    fn password_provider() -> PasswordAuthenticationProvider {
        PasswordAuthenticationProvider::new(store(), Arc::new(PlainTextPasswordEncoder))
    }

    #[tokio::test]
    async fn test_password_success_carries_exact_authorities() {
        let token = password_provider()
            .authenticate(AuthenticationToken::password("mrbird", "123456"))
            .await
            .unwrap();

        assert!(token.is_authenticated());
        assert_eq!(token.principal(), "mrbird");
        let expected: Vec<&str> = vec!["admin", "user:add"];
        assert_eq!(
            token.authorities().iter().map(String::as_str).collect::<Vec<_>>(),
            expected
        );
    }

    #[tokio::test]
    async fn test_password_mismatch_is_bad_credentials() {
        let err = password_provider()
            .authenticate(AuthenticationToken::password("mrbird", "654321"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
    }

    #[tokio::test]
    async fn test_password_unknown_principal() {
        let err = password_provider()
            .authenticate(AuthenticationToken::password("nobody", "123456"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::PrincipalNotFound);
    }

    #[tokio::test]
    async fn test_password_principal_without_secret_never_matches() {
        let err = password_provider()
            .authenticate(AuthenticationToken::password("oauth-only", ""))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
    }

    #[tokio::test]
    async fn test_account_status_checks() {
        let provider = password_provider();

        let err = provider
            .authenticate(AuthenticationToken::password("locked", "123456"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AccountLocked);

        // Checked only after the secret matched
        let err = provider
            .authenticate(AuthenticationToken::password("stale", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
        let err = provider
            .authenticate(AuthenticationToken::password("stale", "123456"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::CredentialsExpired);
    }

    #[tokio::test]
    async fn test_sms_resolves_principal_by_mobile() {
        let provider = SmsCodeAuthenticationProvider::new(store());

        let token = provider
            .authenticate(AuthenticationToken::sms_code("+1555"))
            .await
            .unwrap();
        assert!(token.is_authenticated());
        assert_eq!(token.principal(), "mrbird");
        assert!(token.has_authority("admin"));

        let err = provider
            .authenticate(AuthenticationToken::sms_code("+1999"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::PrincipalNotFound);
    }

    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn lookup(&self, _: &str) -> Result<Option<Principal>, CredentialStoreError> {
            Err(CredentialStoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_surfaces() {
        let provider = SmsCodeAuthenticationProvider::new(Arc::new(FailingStore));
        let err = provider
            .authenticate(AuthenticationToken::sms_code("+1555"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialLookup(_)));
    }

    #[test]
    fn test_supports() {
        assert!(password_provider().supports(Scheme::Password));
        assert!(!password_provider().supports(Scheme::SmsCode));
        let sms = SmsCodeAuthenticationProvider::new(store());
        assert!(sms.supports(Scheme::SmsCode));
        assert!(!sms.supports(Scheme::Password));
    }
}
