//! Email verification and password reset flows.
//!
//! Thin layer over [`AuthEngine`] that mints action tokens, builds the links
//! and hands the mail to a [`Notifier`].

use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::db::{User, normalize_email};
use crate::engine::AuthEngine;
use crate::error::{AuthError, ResultExt};
use crate::notify::{DeliveryStatus, Notifier};

/// Returned for every reset request, whether or not the account exists.
pub const RESET_REQUESTED_MESSAGE: &str = "If that email exists, a reset link has been sent.";

#[derive(Clone)]
pub struct ActionTokenFlows {
    engine: AuthEngine,
    notifier: Arc<dyn Notifier>,
    app_url: Url,
}

impl ActionTokenFlows {
    /// `app_url` is the front-end origin the emailed links point at.
    pub fn new(engine: AuthEngine, notifier: Arc<dyn Notifier>, app_url: Url) -> Self {
        Self {
            engine,
            notifier,
            app_url,
        }
    }

    /// Email a verification link to a freshly registered user.
    pub fn send_verification(&self, user: &User) -> Result<DeliveryStatus, AuthError> {
        let token = self.engine.issue_verification(&user.email)?;
        let link = self.action_link("verify-email", &token)?;
        let html = format!(
            "<p>Welcome! Verify: <a href='{}'>Click to verify</a></p>",
            link
        );
        Ok(self.deliver(&user.email, "Verify your email", &html))
    }

    /// Email a reset link if the account exists.
    ///
    /// Always returns [`RESET_REQUESTED_MESSAGE`] so the response cannot be
    /// used to discover which accounts exist.
    pub async fn request_password_reset(&self, email: &str) -> Result<&'static str, AuthError> {
        let email = normalize_email(email);
        let user = self
            .engine
            .db()
            .users()
            .get_by_email(&email)
            .await
            .infra("Failed to look up user")?;

        if let Some(user) = user {
            let token = self.engine.issue_password_reset(&user.email)?;
            let link = self.action_link("reset-password", &token)?;
            let html = format!(
                "<p>Reset your password: <a href='{}'>Reset</a></p>",
                link
            );
            self.deliver(&user.email, "Password reset", &html);
            info!(user_id = user.id, "Password reset requested");
        }

        Ok(RESET_REQUESTED_MESSAGE)
    }

    /// Confirm an email address.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        self.engine.consume_verification(token).await
    }

    /// Set a new password using a reset token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User, AuthError> {
        self.engine.consume_password_reset(token, new_password).await
    }

    fn deliver(&self, to: &str, subject: &str, html: &str) -> DeliveryStatus {
        let status = self.notifier.send(to, subject, html);
        if status == DeliveryStatus::Failed {
            warn!(to = %to, subject = %subject, "Email delivery failed");
        }
        status
    }

    fn action_link(&self, path: &str, token: &str) -> Result<String, AuthError> {
        let mut link = self.app_url.clone();
        link.path_segments_mut()
            .map_err(|_| AuthError::Infrastructure("App URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(path);
        link.query_pairs_mut().clear().append_pair("token", token);
        Ok(link.into())
    }
}
