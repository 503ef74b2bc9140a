//! Data model shared by the session core and its consumers.

use std::{fmt, ops::BitOr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event identifier. The service hands out `-1` as the initial cursor of a
/// fresh queue, so this is signed.
pub type EventId = i64;

/// Opaque identifier of a server-side event queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Wrap a raw queue identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user as listed in the recipients of a private message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub short_name: String,
}

/// Where a message was addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recipient {
    /// Posted to a stream under a topic.
    Stream { stream: String, topic: String },
    /// Sent privately to one or more users.
    Private { users: Vec<User> },
}

/// Discriminant of [`Recipient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Stream,
    Private,
}

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender_name: String,
    pub sender_email: String,
    pub recipient: Recipient,
    pub content: String,
    /// Unix epoch seconds.
    pub timestamp: u64,
}

impl Message {
    #[must_use]
    pub const fn recipient_kind(&self) -> RecipientKind {
        match self.recipient {
            Recipient::Stream { .. } => RecipientKind::Stream,
            Recipient::Private { .. } => RecipientKind::Private,
        }
    }

    /// Stream name, for stream messages.
    #[must_use]
    pub fn stream_name(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::Stream { stream, .. } => Some(stream),
            Recipient::Private { .. } => None,
        }
    }

    /// Topic, for stream messages.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::Stream { topic, .. } => Some(topic),
            Recipient::Private { .. } => None,
        }
    }
}

/// What an [`Event`] carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A new message arrived.
    Message(Message),
    /// Keep-alive sent by the server while a long-poll is held open.
    Heartbeat,
    /// A tag this client does not understand. Reported, never fatal.
    Unsupported { tag: String },
}

/// One entry of an event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
}

impl Event {
    #[must_use]
    pub const fn heartbeat(id: EventId) -> Self {
        Self {
            id,
            kind: EventKind::Heartbeat,
        }
    }

    #[must_use]
    pub const fn message(id: EventId, message: Message) -> Self {
        Self {
            id,
            kind: EventKind::Message(message),
        }
    }

    #[must_use]
    pub fn unsupported(id: EventId, tag: impl Into<String>) -> Self {
        Self {
            id,
            kind: EventKind::Unsupported { tag: tag.into() },
        }
    }
}

/// The only values the session core hands to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NormalizedOutput {
    IncomingMessage(Message),
    StatusNote(String),
    Failure(String),
}

impl NormalizedOutput {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Set of event types requested when registering a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventMask(u8);

impl EventMask {
    pub const MESSAGE: Self = Self(1);
    pub const SUBSCRIPTIONS: Self = Self(1 << 1);
    pub const REALM_USER: Self = Self(1 << 2);
    pub const POINTER: Self = Self(1 << 3);

    const ALL: Self =
        Self(Self::MESSAGE.0 | Self::SUBSCRIPTIONS.0 | Self::REALM_USER.0 | Self::POINTER.0);
    const NAMES: [(Self, &'static str); 4] = [
        (Self::MESSAGE, "message"),
        (Self::SUBSCRIPTIONS, "subscriptions"),
        (Self::REALM_USER, "realm_user"),
        (Self::POINTER, "pointer"),
    ];

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The mask actually sent on the wire: an empty mask means every type.
    #[must_use]
    pub const fn effective(self) -> Self {
        if self.is_empty() { Self::ALL } else { self }
    }

    /// Wire names of the effective event types, in registration order.
    #[must_use]
    pub fn type_names(self) -> Vec<&'static str> {
        let effective = self.effective();
        Self::NAMES
            .iter()
            .filter(|(flag, _)| effective.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Rejected outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutgoingError {
    #[error("Subject (topic) is required when sending a stream message")]
    MissingTopic,
    #[error("Stream name is required when sending a stream message")]
    MissingStream,
    #[error("At least one recipient is required when sending a private message")]
    NoRecipients,
}

/// A message the user wants to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Stream {
        stream: String,
        topic: String,
        content: String,
    },
    Private {
        /// Recipient email addresses.
        to: Vec<String>,
        content: String,
    },
}

impl OutgoingMessage {
    /// Check the message can be submitted at all.
    ///
    /// # Errors
    /// Returns error for a stream message without stream or topic, or a
    /// private message without recipients.
    pub fn validate(&self) -> Result<(), OutgoingError> {
        match self {
            Self::Stream { stream, topic, .. } => {
                if stream.trim().is_empty() {
                    return Err(OutgoingError::MissingStream);
                }
                if topic.trim().is_empty() {
                    return Err(OutgoingError::MissingTopic);
                }
                Ok(())
            }
            Self::Private { to, .. } => {
                if to.iter().all(|addr| addr.trim().is_empty()) {
                    return Err(OutgoingError::NoRecipients);
                }
                Ok(())
            }
        }
    }

    /// Human-readable kind used in status notes.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "Stream",
            Self::Private { .. } => "Private",
        }
    }
}
