//! Core abstractions for the clisiana messaging client.
//!
//! This crate provides the fundamental building blocks:
//! - `ClientContext` - Immutable connection settings handed to `start()`
//! - `Event`, `Message`, `NormalizedOutput` - Typed data model
//! - `wire` - Decoding of the service's JSON replies
//! - `OutputSender` / `OutputReceiver` - Bounded multi-producer output channel
//! - `EventSource` and `MessageSender` traits for the remote service

pub mod context;
pub mod notify;
pub mod output;
pub mod traits;
pub mod types;
pub mod wire;

pub use context::{ClientContext, ContextError};
pub use notify::{NoopNotifier, Notification, Notifier, NotifyError, notification_for};
pub use output::{
    DEFAULT_OUTPUT_CAPACITY, OutputError, OutputReceiver, OutputSender, output_channel,
};
pub use traits::{EventSource, MessageSender, Registration, SourceError};
pub use types::{
    Event, EventId, EventKind, EventMask, Message, NormalizedOutput, OutgoingError,
    OutgoingMessage, QueueId, Recipient, RecipientKind, User,
};
