//! Core traits for the remote messaging service.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    ClientContext,
    types::{Event, EventId, EventMask, OutgoingMessage, QueueId},
    wire::DecodeError,
};

/// Text a transport reports when a request was aborted from our side.
pub const CANCELED_SUFFIX: &str = "request canceled";

/// Result of a successful queue registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub queue_id: QueueId,
    /// Cursor to pass to the first `get_events` call.
    pub last_event_id: EventId,
}

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The in-flight request was aborted because a stop signal arrived.
    #[error("request canceled")]
    Canceled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("API call returned {result}: {msg}")]
    Api { result: String, msg: String },
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),
    #[error("operation not supported by this source")]
    Unsupported,
}

impl SourceError {
    /// Whether this error is the transport's report of our own cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Transport(text) => text.trim_end().ends_with(CANCELED_SUFFIX),
            _ => false,
        }
    }
}

/// Remote source of long-polled events.
///
/// Implementations must be cancel-safe: dropping a pending `get_events`
/// future aborts the underlying request.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Create a server-side queue for the given event types.
    async fn register(
        &self,
        ctx: &ClientContext,
        mask: EventMask,
        apply_markdown: bool,
    ) -> Result<Registration, SourceError>;

    /// Fetch events newer than `last_event_id`.
    ///
    /// With `blocking` set the server holds the request open until an event
    /// exists or its heartbeat interval elapses.
    async fn get_events(
        &self,
        ctx: &ClientContext,
        queue_id: &QueueId,
        last_event_id: EventId,
        blocking: bool,
    ) -> Result<Vec<Event>, SourceError>;

    /// Check the server can be reached at all.
    async fn probe(&self, _ctx: &ClientContext) -> Result<(), SourceError> {
        Err(SourceError::Unsupported)
    }
}

/// Submits outgoing messages.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a message and return the id the server assigned to it.
    async fn send_message(
        &self,
        ctx: &ClientContext,
        message: &OutgoingMessage,
    ) -> Result<u64, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_variant_is_cancellation() {
        assert!(SourceError::Canceled.is_cancellation());
        assert_eq!(SourceError::Canceled.to_string(), "request canceled");
    }

    #[test]
    fn transport_text_ending_in_canceled_is_cancellation() {
        let err = SourceError::Transport(
            "Get https://chat.example.org/api/v1/events: net/http: request canceled".into(),
        );
        assert!(err.is_cancellation());
    }

    #[test]
    fn other_errors_are_not_cancellation() {
        assert!(!SourceError::Transport("connection reset by peer".into()).is_cancellation());
        assert!(!SourceError::Status(502).is_cancellation());
        assert!(
            !SourceError::Api {
                result: "error".into(),
                msg: "Bad event queue id".into(),
            }
            .is_cancellation()
        );
    }
}
