//! Outbound chat notifications
//!
//! Notifications are sent after the owning state change has committed.
//! Delivery is at-most-once: failures are logged here and never reach
//! the caller of the triggering operation.

pub mod messages;

use tracing::warn;

use crate::error::Result;

/// Chat delivery backend
pub trait Notifier: Send + Sync {
    /// Direct message to one chat user
    fn notify(&self, chat_id: &str, body: &str) -> Result<()>;

    /// One broadcast that mentions every target
    fn announce(&self, chat_ids: &[String], body: &str) -> Result<()>;
}

/// Notifier that drops everything (no chat integration configured)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _chat_id: &str, _body: &str) -> Result<()> {
        Ok(())
    }

    fn announce(&self, _chat_ids: &[String], _body: &str) -> Result<()> {
        Ok(())
    }
}

/// Send a direct message, logging and swallowing any failure
pub fn send_direct(notifier: &dyn Notifier, chat_id: &str, body: &str) {
    if let Err(e) = notifier.notify(chat_id, body) {
        warn!(chat_id = %chat_id, error = %e, "Failed to deliver direct notification");
    }
}

/// Broadcast to a set of chat users, logging and swallowing any failure
pub fn send_announcement(notifier: &dyn Notifier, chat_ids: &[String], body: &str) {
    if chat_ids.is_empty() {
        return;
    }
    if let Err(e) = notifier.announce(chat_ids, body) {
        warn!(targets = chat_ids.len(), error = %e, "Failed to deliver announcement");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[test]
    fn test_failures_are_swallowed() {
        let notifier = RecordingNotifier::failing();
        send_direct(&notifier, "123", "hello");
        send_announcement(&notifier, &["123".to_string()], "hello");
    }

    #[test]
    fn test_empty_announcement_is_skipped() {
        let notifier = RecordingNotifier::default();
        send_announcement(&notifier, &[], "nobody");
        assert!(notifier.announcements.lock().unwrap().is_empty());
    }
}
