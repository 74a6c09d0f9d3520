//! Registration, login, refresh rotation, logout and action tokens.
//!
//! Access, verify and reset tokens are stateless: they are valid until they
//! expire and cannot be revoked individually. Refresh tokens embed the secret
//! of a stored session and are single-use: every successful refresh retires
//! the presented session and opens exactly one new one.

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Database, User, UserRole, generate_secret, normalize_email};
use crate::error::{AuthError, ResultExt};
use crate::jwt::{Claims, RESET_TOKEN_TTL, TokenCodec, VERIFY_TOKEN_TTL};
use crate::password::CredentialStore;

/// An access token together with its refresh token.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthEngine {
    db: Database,
    codec: Arc<TokenCodec>,
    credentials: CredentialStore,
}

impl AuthEngine {
    pub fn new(db: Database, codec: Arc<TokenCodec>, credentials: CredentialStore) -> Self {
        Self {
            db,
            codec,
            credentials,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an unverified account with the `user` role.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);

        if self
            .db
            .users()
            .get_by_email(&email)
            .await
            .infra("Failed to look up user")?
            .is_some()
        {
            return Err(AuthError::DuplicateEmail);
        }

        let hash = self
            .credentials
            .hash(password)
            .await
            .infra("Failed to hash password")?;

        match self.db.users().create(&email, &hash).await {
            Ok(user) => {
                info!(user_id = user.id, email = %user.email, "User registered");
                Ok(user)
            }
            // Lost a race with a concurrent registration
            Err(e)
                if e.as_database_error()
                    .is_some_and(|db_err| db_err.is_unique_violation()) =>
            {
                Err(AuthError::DuplicateEmail)
            }
            Err(e) => Err(e).infra("Failed to create user"),
        }
    }

    /// Check credentials and open a new refresh session.
    ///
    /// Unknown email and wrong password are reported identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<(TokenPair, User), AuthError> {
        let email = normalize_email(email);

        let Some(user) = self
            .db
            .users()
            .get_by_email(&email)
            .await
            .infra("Failed to look up user")?
        else {
            self.credentials.verify_absent(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        if !self.credentials.verify(password, &user.password_hash).await {
            return Err(AuthError::InvalidCredentials);
        }

        let secret = generate_secret();
        self.db
            .sessions()
            .create(&secret, user.id)
            .await
            .infra("Failed to create refresh session")?;

        let tokens = self.mint_pair(&user, secret)?;
        info!(user_id = user.id, "User logged in");
        Ok((tokens, user))
    }

    /// Exchange a refresh token for a new pair, retiring the presented one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let Some(Claims::Refresh { token: old_secret }) = self.codec.decode(refresh_token) else {
            return Err(AuthError::InvalidToken);
        };

        let new_secret = generate_secret();
        let rotated = self
            .db
            .sessions()
            .rotate(&old_secret, &new_secret)
            .await
            .infra("Failed to rotate refresh session")?;

        let Some(user_id) = rotated else {
            if let Ok(Some(session)) = self.db.sessions().get_by_secret(&old_secret).await {
                warn!(
                    user_id = session.user_id,
                    session_id = session.id,
                    "Revoked refresh token presented again"
                );
            }
            return Err(AuthError::InvalidToken);
        };

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await
            .infra("Failed to look up user")?
            .ok_or(AuthError::InvalidToken)?;

        self.mint_pair(&user, new_secret)
    }

    /// Revoke the session behind a refresh token. Unknown, already revoked or
    /// undecodable tokens are silently accepted.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        if let Some(Claims::Refresh { token }) = self.codec.decode(refresh_token) {
            let revoked = self
                .db
                .sessions()
                .revoke(&token)
                .await
                .infra("Failed to revoke refresh session")?;
            if revoked {
                info!("Refresh session revoked");
            }
        }
        Ok(())
    }

    /// Mint an email verification token for `email`.
    pub fn issue_verification(&self, email: &str) -> Result<String, AuthError> {
        self.codec
            .mint(
                &Claims::Verify {
                    sub: normalize_email(email),
                },
                VERIFY_TOKEN_TTL,
            )
            .infra("Failed to mint verification token")
    }

    /// Mint a password reset token for `email`.
    pub fn issue_password_reset(&self, email: &str) -> Result<String, AuthError> {
        self.codec
            .mint(
                &Claims::Reset {
                    sub: normalize_email(email),
                },
                RESET_TOKEN_TTL,
            )
            .infra("Failed to mint reset token")
    }

    /// Mark the token's subject as verified.
    ///
    /// The token stays usable until it expires; repeating the call is harmless.
    pub async fn consume_verification(&self, token: &str) -> Result<User, AuthError> {
        let Some(Claims::Verify { sub }) = self.codec.decode(token) else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let mut user = self
            .db
            .users()
            .get_by_email(&sub)
            .await
            .infra("Failed to look up user")?
            .ok_or(AuthError::UserNotFound)?;

        self.db
            .users()
            .mark_verified(user.id)
            .await
            .infra("Failed to mark user verified")?;
        user.verified = true;

        info!(user_id = user.id, "Email verified");
        Ok(user)
    }

    /// Replace the token subject's password.
    ///
    /// Existing sessions are left alone and the token stays usable until it
    /// expires.
    pub async fn consume_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        let Some(Claims::Reset { sub }) = self.codec.decode(token) else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let mut user = self
            .db
            .users()
            .get_by_email(&sub)
            .await
            .infra("Failed to look up user")?
            .ok_or(AuthError::InvalidToken)?;

        let hash = self
            .credentials
            .hash(new_password)
            .await
            .infra("Failed to hash password")?;

        self.db
            .users()
            .set_password_hash(user.id, &hash)
            .await
            .infra("Failed to update password")?;
        user.password_hash = hash;

        info!(user_id = user.id, "Password reset");
        Ok(user)
    }

    /// All accounts, in creation order.
    pub async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        self.db.users().list().await.infra("Failed to list users")
    }

    /// Promote or demote an account.
    pub async fn set_role(&self, user_id: i64, role: UserRole) -> Result<User, AuthError> {
        let updated = self
            .db
            .users()
            .set_role(user_id, role)
            .await
            .infra("Failed to set role")?;
        if !updated {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id, role = %role, "Role changed");
        self.db
            .users()
            .get_by_id(user_id)
            .await
            .infra("Failed to look up user")?
            .ok_or(AuthError::UserNotFound)
    }

    fn mint_pair(&self, user: &User, session_secret: String) -> Result<TokenPair, AuthError> {
        let access_token = self
            .codec
            .mint(
                &Claims::Access {
                    sub: user.email.clone(),
                    role: user.role,
                },
                self.codec.access_ttl(),
            )
            .infra("Failed to mint access token")?;

        let refresh_token = self
            .codec
            .mint(
                &Claims::Refresh {
                    token: session_secret,
                },
                self.codec.refresh_ttl(),
            )
            .infra("Failed to mint refresh token")?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}
