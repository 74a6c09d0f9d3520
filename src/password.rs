//! Password hashing and verification.
//!
//! Hashes are bcrypt (salted, adaptive). bcrypt only reads the first 72 bytes
//! of its input, so longer passwords are refused by [`validate_password`]
//! before they ever reach the hasher.

use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Shortest accepted password, in bytes.
pub const MIN_PASSWORD_BYTES: usize = 8;

/// bcrypt input ceiling, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Input for the stand-in hash checked when an account does not exist.
const DUMMY_PASSWORD: &str = "latchkey-absent-account";

/// Check a password against the accepted length range.
pub fn validate_password(password: &str) -> Result<(), String> {
    let len = password.len();
    if len < MIN_PASSWORD_BYTES {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_BYTES
        ));
    }
    if len > MAX_PASSWORD_BYTES {
        return Err(format!(
            "Password cannot be longer than {} bytes",
            MAX_PASSWORD_BYTES
        ));
    }
    Ok(())
}

/// Hashes and verifies credentials with a fixed bcrypt cost.
///
/// Work runs on the blocking thread pool so request tasks are not stalled.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    cost: u32,
    /// Hash at `cost`, made on first use and shared between clones
    dummy_hash: Arc<OnceLock<String>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialStore {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.max(MIN_BCRYPT_COST),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with a fresh salt.
    pub async fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let cost = self.cost;
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await?
            .map_err(CredentialError::Hash)
    }

    /// Check a password against a stored hash. A malformed hash never matches.
    pub async fn verify(&self, password: &str, hash: &str) -> bool {
        let password = password.to_owned();
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!(error = %e, "Stored credential hash could not be checked");
                false
            }
            Err(e) => {
                warn!(error = %e, "Credential check task failed");
                false
            }
        }
    }

    /// Do the work of one [`verify`](Self::verify) for an account that does
    /// not exist, so the lookup miss costs the same as a wrong password.
    /// Never matches.
    pub async fn verify_absent(&self, password: &str) {
        let cost = self.cost;
        let dummy_hash = self.dummy_hash.clone();
        let password = password.to_owned();
        let result = tokio::task::spawn_blocking(move || {
            let hash = dummy_hash.get_or_init(|| {
                bcrypt::hash(DUMMY_PASSWORD, cost).unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to build stand-in credential hash");
                    String::new()
                })
            });
            bcrypt::verify(password, hash)
        })
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Credential check task failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn has_dummy_hash(&self) -> bool {
        self.dummy_hash.get().is_some_and(|hash| !hash.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to hash password: {0}")]
    Hash(bcrypt::BcryptError),
    #[error("Hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let store = CredentialStore::new(MIN_BCRYPT_COST);
        let hash = store.hash("correct-horse").await.unwrap();

        assert!(hash.starts_with("$2"));
        assert_ne!(hash, "correct-horse");
        assert!(store.verify("correct-horse", &hash).await);
        assert!(!store.verify("wrong-horse", &hash).await);
    }

    #[tokio::test]
    async fn test_same_password_different_salt() {
        let store = CredentialStore::new(MIN_BCRYPT_COST);
        let a = store.hash("correct-horse").await.unwrap();
        let b = store.hash("correct-horse").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_never_matches() {
        let store = CredentialStore::new(MIN_BCRYPT_COST);
        assert!(!store.verify("correct-horse", "correct-horse").await);
    }

    #[tokio::test]
    async fn test_verify_absent_uses_configured_cost() {
        let store = CredentialStore::new(5);
        assert!(!store.has_dummy_hash());

        store.verify_absent("correct-horse").await;
        assert!(store.has_dummy_hash());

        // Clones share the stand-in hash
        let clone = store.clone();
        assert!(clone.has_dummy_hash());
        let hash = clone.dummy_hash.get().unwrap();
        assert!(hash.starts_with("$2b$05$"));
        assert!(!store.verify("correct-horse", hash).await);
    }

    #[test]
    fn test_cost_floor() {
        assert_eq!(CredentialStore::new(1).cost(), MIN_BCRYPT_COST);
        assert_eq!(CredentialStore::default().cost(), bcrypt::DEFAULT_COST);
    }

    #[test]
    fn test_validate_password_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password(&"a".repeat(72)).is_ok());
        assert!(validate_password(&"a".repeat(73)).is_err());
        // 24 three-byte characters = 72 bytes, 25 = 75 bytes
        assert!(validate_password(&"€".repeat(24)).is_ok());
        assert!(validate_password(&"€".repeat(25)).is_err());
    }
}
