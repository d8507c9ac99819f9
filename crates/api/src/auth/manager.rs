//! Provider dispatch

use std::sync::Arc;

use authgate_shared::AuthError;

use super::provider::AuthenticationProvider;
use super::token::AuthenticationToken;

/// Ordered set of providers; a token goes to the first one that supports its
/// scheme.
#[derive(Clone, Default)]
pub struct AuthenticationManager {
    providers: Vec<Arc<dyn AuthenticationProvider>>,
}

impl AuthenticationManager {
    pub fn new(providers: Vec<Arc<dyn AuthenticationProvider>>) -> Self {
        Self { providers }
    }

    /// Register a provider after the existing ones
    pub fn with_provider(mut self, provider: Arc<dyn AuthenticationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub async fn authenticate(
        &self,
        token: AuthenticationToken,
    ) -> Result<AuthenticationToken, AuthError> {
        let scheme = token.scheme();
        let Some(provider) = self.providers.iter().find(|p| p.supports(scheme)) else {
            tracing::warn!(scheme = %scheme, "No authentication provider registered for scheme");
            return Err(AuthError::UnsupportedScheme(scheme.to_string()));
        };

        let submitted = token.principal().to_string();
        match provider.authenticate(token).await {
            Ok(mut authenticated) => {
                authenticated.erase_credentials();
                tracing::info!(
                    scheme = %scheme,
                    principal = %authenticated.principal(),
                    authorities = authenticated.authorities().len(),
                    "Authentication succeeded"
                );
                Ok(authenticated)
            }
            Err(e) => {
                tracing::warn!(
                    scheme = %scheme,
                    identifier = %submitted,
                    reason = e.code(),
                    "Authentication failed"
                );
                Err(e)
            }
        }
    }
}
