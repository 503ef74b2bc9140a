//! Desktop notification mapping.
//!
//! Delivery itself is platform-specific and lives with the application; this
//! module only decides what a notification for a message looks like.

use thiserror::Error;

use crate::types::{Message, Recipient};

/// A notification to display. Only title and content are honored everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub content: String,
    pub icon: Option<String>,
}

/// Notification delivery failure.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sink for desktop notifications.
pub trait Notifier: Send + Sync {
    /// Show a notification.
    ///
    /// # Errors
    /// Returns error if the platform refused the notification.
    fn push(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn push(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Build the notification shown for an incoming message.
#[must_use]
pub fn notification_for(message: &Message) -> Notification {
    let title = match &message.recipient {
        Recipient::Stream { stream, topic } => format!("{stream} > {topic}"),
        Recipient::Private { .. } => format!("Private message from {}", message.sender_name),
    };
    Notification {
        title,
        content: message.content.clone(),
        icon: None,
    }
}
