//! Outcomes of the authentication core.

use tracing::error;

/// Every failure the engine, guard and action-token flows can report.
///
/// All variants except `Infrastructure` are expected outcomes that the caller
/// handles; none are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("User not found")]
    UserNotFound,
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,
    /// A store, hashing or signing fault. The message is for logs only.
    #[error("{0}")]
    Infrastructure(String),
}

/// Extension trait for mapping collaborator faults onto `AuthError::Infrastructure`.
pub trait ResultExt<T> {
    fn infra(self, context: &str) -> Result<T, AuthError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn infra(self, context: &str) -> Result<T, AuthError> {
        self.map_err(|e| {
            error!(error = %e, "{}", context);
            AuthError::Infrastructure(format!("{}: {}", context, e))
        })
    }
}
