//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::bearer_token;
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use crate::db::UserRole;
use crate::guard::{Identity, authorize};

/// Role requirement checked by [`Auth`].
pub trait RoleConstraint {
    /// `None` accepts any authenticated caller.
    fn required() -> Option<UserRole>;
}

/// Any authenticated caller.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn required() -> Option<UserRole> {
        None
    }
}

/// Callers whose role is exactly `admin`.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn required() -> Option<UserRole> {
        Some(UserRole::Admin)
    }
}

/// Extractor for endpoints that require a bearer access token.
/// The role constraint is checked after the token is resolved.
pub struct Auth<R: RoleConstraint = AnyRole>(pub Identity, PhantomData<R>);

impl<R: RoleConstraint> Auth<R> {
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        let identity = state.guard().authenticate(token).await?;

        let identity = match R::required() {
            Some(role) => authorize(identity, role)?,
            None => identity,
        };

        Ok(Auth(identity, PhantomData))
    }
}
