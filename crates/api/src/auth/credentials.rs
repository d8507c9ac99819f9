//! Credential store
//!
//! The core only ever asks one question of the user directory: "who is this
//! identifier?". Lookups must be idempotent and free of side effects.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use authgate_shared::Principal;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a username or mobile number to a principal
    async fn lookup(&self, identifier: &str) -> Result<Option<Principal>, CredentialStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("Failed to read credentials file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse credentials file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate identifier in credentials: {0}")]
    Duplicate(String),
    #[error("Credential backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default)]
struct Directory {
    by_username: HashMap<String, Principal>,
    /// mobile -> username
    by_mobile: HashMap<String, String>,
}

/// Process-local credential store indexed by username and mobile number
#[derive(Default)]
pub struct InMemoryCredentialStore {
    directory: RwLock<Directory>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of principals
    pub fn with_principals<I>(principals: I) -> Result<Self, CredentialStoreError>
    where
        I: IntoIterator<Item = Principal>,
    {
        let store = Self::new();
        for principal in principals {
            store.insert(principal)?;
        }
        Ok(store)
    }

    /// Load a JSON array of principals
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CredentialStoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let principals: Vec<Principal> = serde_json::from_str(&raw)?;
        let store = Self::with_principals(principals)?;

        tracing::info!(
            path = %path.as_ref().display(),
            principals = store.len(),
            "Loaded credentials file"
        );

        Ok(store)
    }

    /// Add a principal. Usernames and mobile numbers must be unique across both
    /// indexes.
    pub fn insert(&self, principal: Principal) -> Result<(), CredentialStoreError> {
        let mut directory = self
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let taken = |id: &str, dir: &Directory| {
            dir.by_username.contains_key(id) || dir.by_mobile.contains_key(id)
        };

        if taken(&principal.username, &*directory) {
            return Err(CredentialStoreError::Duplicate(principal.username));
        }
        if let Some(mobile) = &principal.mobile {
            if taken(mobile, &*directory) || mobile == &principal.username {
                return Err(CredentialStoreError::Duplicate(mobile.clone()));
            }
            directory
                .by_mobile
                .insert(mobile.clone(), principal.username.clone());
        }

        directory
            .by_username
            .insert(principal.username.clone(), principal);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_username
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn lookup(&self, identifier: &str) -> Result<Option<Principal>, CredentialStoreError> {
        let directory = self
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(principal) = directory.by_username.get(identifier) {
            return Ok(Some(principal.clone()));
        }

        Ok(directory
            .by_mobile
            .get(identifier)
            .and_then(|username| directory.by_username.get(username))
            .cloned())
    }
}
