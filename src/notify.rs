//! Outbound email capability.
//!
//! Delivery is fire-and-forget from the caller's point of view: a failed send
//! is logged, never turned into an error for the request that triggered it.

use std::sync::Mutex;
use tracing::info;

/// Outcome reported by a [`Notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Accepted,
    Failed,
}

/// Sends an HTML email.
pub trait Notifier: Send + Sync {
    fn send(&self, to_email: &str, subject: &str, html_body: &str) -> DeliveryStatus;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, to_email: &str, subject: &str, html_body: &str) -> DeliveryStatus {
        info!(to = %to_email, subject = %subject, body = %html_body, "Outbound email");
        DeliveryStatus::Accepted
    }
}

/// A message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// The most recent message sent to `to_email`.
    pub fn last_to(&self, to_email: &str) -> Option<OutboundMessage> {
        self.messages().into_iter().rev().find(|m| m.to == to_email)
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, to_email: &str, subject: &str, html_body: &str) -> DeliveryStatus {
        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(OutboundMessage {
                    to: to_email.to_string(),
                    subject: subject.to_string(),
                    html_body: html_body.to_string(),
                });
                DeliveryStatus::Accepted
            }
            Err(_) => DeliveryStatus::Failed,
        }
    }
}

/// Pull the `token` query parameter out of the first link in an email body.
pub fn token_from_link(html_body: &str) -> Option<&str> {
    let start = html_body.find("token=")? + "token=".len();
    let rest = &html_body[start..];
    let end = rest
        .find(|c: char| c == '\'' || c == '"' || c == '&')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.send("a@example.com", "One", "<p>1</p>");
        notifier.send("b@example.com", "Two", "<p>2</p>");
        notifier.send("a@example.com", "Three", "<p>3</p>");

        assert_eq!(notifier.messages().len(), 3);
        assert_eq!(notifier.last_to("a@example.com").unwrap().subject, "Three");
        assert!(notifier.last_to("c@example.com").is_none());
    }

    #[test]
    fn test_token_from_link() {
        let body = "<p>Reset: <a href='http://x/reset-password?token=abc.def-ghi_j'>Reset</a></p>";
        assert_eq!(token_from_link(body), Some("abc.def-ghi_j"));
        assert_eq!(token_from_link("<p>no link</p>"), None);
    }
}
