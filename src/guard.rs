//! Access token validation and role checks for protected operations.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::db::{Database, UserRole};
use crate::error::{AuthError, ResultExt};
use crate::jwt::{Claims, TokenCodec};

/// The caller behind a valid access token, as currently stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub verified: bool,
}

#[derive(Clone)]
pub struct AccessGuard {
    db: Database,
    codec: Arc<TokenCodec>,
}

impl AccessGuard {
    pub fn new(db: Database, codec: Arc<TokenCodec>) -> Self {
        Self { db, codec }
    }

    /// Resolve an access token to its caller.
    ///
    /// Bad signature, expiry, wrong token type and unknown subject all give
    /// the same `Unauthorized`.
    pub async fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError> {
        let Some(Claims::Access { sub, .. }) = self.codec.decode(access_token) else {
            return Err(AuthError::Unauthorized);
        };

        let user = self
            .db
            .users()
            .get_by_email(&sub)
            .await
            .infra("Failed to look up user")?
            .ok_or_else(|| {
                debug!("Access token subject no longer exists");
                AuthError::Unauthorized
            })?;

        Ok(Identity {
            id: user.id,
            email: user.email,
            role: user.role,
            verified: user.verified,
        })
    }

    /// Require the caller's role to be exactly `required`. There is no role
    /// hierarchy.
    pub fn authorize(&self, identity: Identity, required: UserRole) -> Result<Identity, AuthError> {
        authorize(identity, required)
    }
}

/// Exact role match between `identity` and `required`.
pub fn authorize(identity: Identity, required: UserRole) -> Result<Identity, AuthError> {
    if identity.role == required {
        Ok(identity)
    } else {
        Err(AuthError::Forbidden)
    }
}
