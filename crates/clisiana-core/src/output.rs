//! Bounded output channel between the session core and its consumers.
//!
//! Many producers (fetchers, the supervisor, outgoing-message senders) share
//! one ordered channel. Writers wait when it is full; nothing is dropped.

use std::sync::Arc;

use futures::{StreamExt, stream::BoxStream};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    notify::{Notifier, notification_for},
    types::NormalizedOutput,
};

/// Capacity used by the client's main text channel.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 5;

/// Output channel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("output channel is closed")]
    Closed,
    #[error("output channel is full")]
    Full,
}

/// Create a bounded output channel.
#[must_use]
pub fn output_channel(capacity: usize) -> (OutputSender, OutputReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        OutputSender { tx },
        OutputReceiver {
            rx,
            notifier: None,
        },
    )
}

/// Producer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: mpsc::Sender<NormalizedOutput>,
}

impl OutputSender {
    /// Send one value, waiting for room if the channel is full.
    ///
    /// # Errors
    /// Returns error if the receiver is gone.
    pub async fn emit(&self, output: NormalizedOutput) -> Result<(), OutputError> {
        self.tx.send(output).await.map_err(|_| OutputError::Closed)
    }

    /// Send one value only if there is room right now.
    ///
    /// # Errors
    /// Returns error if the channel is full or the receiver is gone.
    pub fn try_emit(&self, output: NormalizedOutput) -> Result<(), OutputError> {
        self.tx.try_send(output).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => OutputError::Full,
            mpsc::error::TrySendError::Closed(_) => OutputError::Closed,
        })
    }

    /// Emit a status note.
    ///
    /// # Errors
    /// Returns error if the receiver is gone.
    pub async fn status(&self, text: impl Into<String>) -> Result<(), OutputError> {
        self.emit(NormalizedOutput::StatusNote(text.into())).await
    }

    /// Emit a failure.
    ///
    /// # Errors
    /// Returns error if the receiver is gone.
    pub async fn failure(&self, text: impl Into<String>) -> Result<(), OutputError> {
        self.emit(NormalizedOutput::Failure(text.into())).await
    }
}

/// Consumer side, owned by the presentation layer.
///
/// An optional notifier sees every `IncomingMessage` as it is received.
pub struct OutputReceiver {
    rx: mpsc::Receiver<NormalizedOutput>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl OutputReceiver {
    /// Attach a notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Wait for the next value. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<NormalizedOutput> {
        let output = self.rx.recv().await?;
        notify_with(self.notifier.as_deref(), &output);
        Some(output)
    }

    /// Receive without waiting (for a UI loop that polls between frames).
    pub fn try_recv(&mut self) -> Option<NormalizedOutput> {
        let output = self.rx.try_recv().ok()?;
        notify_with(self.notifier.as_deref(), &output);
        Some(output)
    }

    /// Convert into a stream of values.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, NormalizedOutput> {
        let Self { rx, notifier } = self;
        ReceiverStream::new(rx)
            .inspect(move |output| notify_with(notifier.as_deref(), output))
            .boxed()
    }
}

fn notify_with(notifier: Option<&dyn Notifier>, output: &NormalizedOutput) {
    let (Some(notifier), NormalizedOutput::IncomingMessage(message)) = (notifier, output) else {
        return;
    };
    if let Err(e) = notifier.push(&notification_for(message)) {
        tracing::warn!("Failed to deliver notification: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use tokio::time::timeout;

    use super::*;
    use crate::{
        notify::{Notification, NotifyError},
        types::{Message, Recipient},
    };

    #[derive(Default)]
    struct RecordingNotifier {
        titles: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn push(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.titles.lock().unwrap().push(notification.title.clone());
            Ok(())
        }
    }

    fn message() -> Message {
        Message {
            id: 1,
            sender_name: "Othello".into(),
            sender_email: "othello@example.com".into(),
            recipient: Recipient::Private { users: vec![] },
            content: "hello".into(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn preserves_order_across_producers() {
        let (tx, mut rx) = output_channel(8);
        let other = tx.clone();

        tx.status("one").await.unwrap();
        other.failure("two").await.unwrap();
        tx.status("three").await.unwrap();

        assert_eq!(rx.recv().await, Some(NormalizedOutput::StatusNote("one".into())));
        assert_eq!(rx.recv().await, Some(NormalizedOutput::Failure("two".into())));
        assert_eq!(rx.recv().await, Some(NormalizedOutput::StatusNote("three".into())));
    }

    #[tokio::test]
    async fn full_channel_blocks_writer_until_read() {
        let (tx, mut rx) = output_channel(1);
        tx.status("first").await.unwrap();

        let blocked = timeout(Duration::from_millis(50), tx.status("second")).await;
        assert!(blocked.is_err(), "second write should wait for room");

        let writer = tokio::spawn({
            let tx = tx.clone();
            async move { tx.status("second").await }
        });
        assert_eq!(rx.recv().await, Some(NormalizedOutput::StatusNote("first".into())));
        tokio_test::assert_ok!(writer.await.unwrap());
        assert_eq!(rx.recv().await, Some(NormalizedOutput::StatusNote("second".into())));
    }

    #[tokio::test]
    async fn notifier_sees_only_incoming_messages() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = output_channel(4);
        let mut rx = rx.with_notifier(notifier.clone());

        tx.status("connected").await.unwrap();
        tx.emit(NormalizedOutput::IncomingMessage(message())).await.unwrap();
        tx.failure("oops").await.unwrap();
        drop(tx);

        while rx.recv().await.is_some() {}
        assert_eq!(
            *notifier.titles.lock().unwrap(),
            vec!["Private message from Othello".to_string()]
        );
    }

    #[tokio::test]
    async fn stream_ends_when_senders_drop() {
        let (tx, rx) = output_channel(4);
        tx.emit(NormalizedOutput::IncomingMessage(message())).await.unwrap();
        drop(tx);

        let collected: Vec<_> = rx.into_stream().collect().await;
        assert_eq!(collected, vec![NormalizedOutput::IncomingMessage(message())]);
    }

    #[tokio::test]
    async fn emit_fails_once_receiver_is_gone() {
        let (tx, rx) = output_channel(4);
        drop(rx);
        tokio_test::assert_err!(tx.status("nobody listening").await);
    }

    #[tokio::test]
    async fn try_emit_reports_full_channel() {
        let (tx, mut rx) = output_channel(1);
        tokio_test::assert_ok!(tx.try_emit(NormalizedOutput::StatusNote("a".into())));
        assert_eq!(
            tx.try_emit(NormalizedOutput::StatusNote("b".into())),
            Err(OutputError::Full)
        );
        assert_eq!(rx.recv().await, Some(NormalizedOutput::StatusNote("a".into())));
        drop(rx);
        assert_eq!(
            tx.try_emit(NormalizedOutput::StatusNote("c".into())),
            Err(OutputError::Closed)
        );
    }

    #[test]
    fn try_recv_is_non_blocking() {
        let (_tx, mut rx) = output_channel(1);
        assert_eq!(rx.try_recv(), None);
    }
}
