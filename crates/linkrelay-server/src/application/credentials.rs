//! Bearer credential validation.
//!
//! Controllers present a personal access token of the form `"<id>|<secret>"`.
//! The backend stores only the SHA-256 hex digest of the secret, so the
//! server hashes the secret and asks the [`TokenStore`] whether the row
//! `(id, digest)` exists.  Affirmative answers are cached in memory; negative
//! answers and store failures are not, and both reject the credential.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Failure of the external token store.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("no token store is configured")]
    Unconfigured,

    #[error("could not open token store: {0}")]
    Connect(String),

    #[error("token lookup failed: {0}")]
    Query(String),
}

/// External lookup of personal access tokens.
///
/// The infrastructure implementation queries MySQL; tests substitute
/// in-memory stores.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns whether a token row with `token_id` and `digest` exists.
    async fn token_exists(&self, token_id: &str, digest: &str) -> Result<bool, TokenStoreError>;
}

/// Lowercase hex SHA-256 of `secret`.
pub fn token_digest(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Splits `"<id>|<secret>"`.  Only the first two segments count; anything
/// after a further `|` is ignored.
fn split_credential(credential: &str) -> Option<(&str, &str)> {
    let mut parts = credential.split('|');
    let token_id = parts.next()?;
    let secret = parts.next()?;
    Some((token_id, secret))
}

/// Validates credentials against a [`TokenStore`] with an affirmative cache.
pub struct CredentialValidator {
    store: Arc<dyn TokenStore>,
    cache: RwLock<HashSet<String>>,
}

impl CredentialValidator {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashSet::new()),
        }
    }

    /// Returns `true` only for a well-formed credential whose digest is cached
    /// or confirmed by the store.
    pub async fn validate(&self, credential: Option<&str>) -> bool {
        let Some((token_id, secret)) = credential.and_then(split_credential) else {
            debug!("credential missing or malformed");
            return false;
        };

        let digest = token_digest(secret);
        if self.cache.read().await.contains(&digest) {
            return true;
        }

        match self.store.token_exists(token_id, &digest).await {
            Ok(true) => {
                self.cache.write().await.insert(digest);
                debug!(
                    "access token {token_id} accepted; {} digest(s) cached",
                    self.cached().await
                );
                true
            }
            Ok(false) => {
                info!("access token {token_id} not recognised");
                false
            }
            Err(e) => {
                warn!("access token {token_id} could not be checked: {e}");
                false
            }
        }
    }

    /// Number of cached affirmative digests.
    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_token_digest_is_lowercase_sha256_hex() {
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_valid_token_is_confirmed_by_store_then_cached() {
        // Arrange: the store must be asked exactly once
        let mut store = MockTokenStore::new();
        store
            .expect_token_exists()
            .with(eq("7"), eq(token_digest("secret")))
            .times(1)
            .returning(|_, _| Ok(true));
        let validator = CredentialValidator::new(Arc::new(store));

        // Act
        let first = validator.validate(Some("7|secret")).await;
        let second = validator.validate(Some("7|secret")).await;

        // Assert
        assert!(first);
        assert!(second);
        assert_eq!(validator.cached().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected_and_not_cached() {
        let mut store = MockTokenStore::new();
        store.expect_token_exists().times(2).returning(|_, _| Ok(false));
        let validator = CredentialValidator::new(Arc::new(store));

        assert!(!validator.validate(Some("7|wrong")).await);
        assert!(!validator.validate(Some("7|wrong")).await);
        assert_eq!(validator.cached().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let mut store = MockTokenStore::new();
        store
            .expect_token_exists()
            .returning(|_, _| Err(TokenStoreError::Query("connection refused".to_string())));
        let validator = CredentialValidator::new(Arc::new(store));

        assert!(!validator.validate(Some("7|secret")).await);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_credential_skips_store() {
        // Arrange: any store call would fail the test
        let mut store = MockTokenStore::new();
        store.expect_token_exists().never();
        let validator = CredentialValidator::new(Arc::new(store));

        // Act / Assert
        assert!(!validator.validate(None).await);
        assert!(!validator.validate(Some("no-separator")).await);
    }

    #[tokio::test]
    async fn test_secret_ends_at_second_separator() {
        let mut store = MockTokenStore::new();
        store
            .expect_token_exists()
            .with(eq("3"), eq(token_digest("a")))
            .times(1)
            .returning(|_, _| Ok(true));
        let validator = CredentialValidator::new(Arc::new(store));

        assert!(validator.validate(Some("3|a|b")).await);
    }
}
