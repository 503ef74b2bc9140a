//! Session manager: starts supervisors and hands out stop handles.

use std::sync::Arc;

use clisiana_core::{ClientContext, EventSource, OutputReceiver, OutputSender, output_channel};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SessionConfig,
    error::SessionError,
    state::{SupervisorSignal, SupervisorState, SupervisorStateMachine},
    supervisor::Supervisor,
};

/// Starts event-stream sessions against one source.
pub struct SessionManager<S: EventSource + ?Sized> {
    source: Arc<S>,
    output: OutputSender,
    config: SessionConfig,
}

impl<S: EventSource + ?Sized + 'static> SessionManager<S> {
    /// Create a manager together with the output channel it writes to.
    #[must_use]
    pub fn new(source: Arc<S>, config: SessionConfig) -> (Self, OutputReceiver) {
        let (output, rx) = output_channel(config.output_capacity);
        (Self::with_output(source, output, config), rx)
    }

    /// Create a manager that writes to an existing output channel.
    #[must_use]
    pub const fn with_output(source: Arc<S>, output: OutputSender, config: SessionConfig) -> Self {
        Self {
            source,
            output,
            config,
        }
    }

    /// Sender for other producers sharing this manager's output channel.
    #[must_use]
    pub fn output(&self) -> OutputSender {
        self.output.clone()
    }

    /// Start a session: register a queue and stream its events.
    ///
    /// The returned handle is already in `Registering`. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the supervisor refuses to start.
    pub fn start(&self, ctx: Arc<ClientContext>) -> Result<SessionHandle, SessionError> {
        let mut machine = SupervisorStateMachine::default();
        let initial = machine.apply(SupervisorSignal::Start)?;
        let (state_tx, state_rx) = watch::channel(initial);
        let stop = CancellationToken::new();

        let supervisor = Supervisor::new(
            Arc::clone(&self.source),
            ctx,
            self.output.clone(),
            self.config,
            stop.clone(),
            machine,
            state_tx,
        );
        tokio::spawn(supervisor.run());

        Ok(SessionHandle {
            stop,
            state: state_rx,
        })
    }
}

/// Handle to a running session.
///
/// Dropping the handle stops the session.
#[derive(Debug)]
pub struct SessionHandle {
    stop: CancellationToken,
    state: watch::Receiver<SupervisorState>,
}

impl SessionHandle {
    /// Stop the session and wait until it has settled.
    ///
    /// Safe to call any number of times, from any state.
    pub async fn stop(&self) {
        self.stop.cancel();
        self.finished().await;
    }

    /// Current supervisor state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Wait until the supervisor is `Idle` (registration failed) or `Closed`.
    pub async fn finished(&self) {
        let mut state = self.state.clone();
        // A dropped sender means the supervisor already published its last state.
        let _ = state.wait_for(|s| s.is_settled()).await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(all(test, feature = "scripted"))]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use clisiana_core::{
        Event, EventId, EventMask, Message, NormalizedOutput, QueueId, Recipient, Registration,
        SourceError,
    };
    use tokio::time::timeout;

    use super::*;
    use crate::source::ScriptedSource;

    fn ctx() -> Arc<ClientContext> {
        Arc::new(
            ClientContext::new("me@example.com", "key", "https://chat.example.com/api/v1", true)
                .unwrap(),
        )
    }

    fn registration(queue: &str, cursor: i64) -> Result<Registration, SourceError> {
        Ok(Registration {
            queue_id: QueueId::new(queue),
            last_event_id: cursor,
        })
    }

    fn stream_message(id: u64) -> Message {
        Message {
            id,
            sender_name: "Desdemona".into(),
            sender_email: "desdemona@example.com".into(),
            recipient: Recipient::Stream {
                stream: "cyprus".into(),
                topic: "arrival".into(),
            },
            content: "hello".into(),
            timestamp: 1_700_000_000,
        }
    }

    fn drain(rx: &mut OutputReceiver) -> Vec<NormalizedOutput> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    /// Panics on the first `get_events` call, then behaves like `inner`.
    struct PanicsOnFirstFetch {
        inner: ScriptedSource,
        panicked: AtomicBool,
    }

    #[async_trait]
    impl EventSource for PanicsOnFirstFetch {
        async fn register(
            &self,
            ctx: &ClientContext,
            mask: EventMask,
            apply_markdown: bool,
        ) -> Result<Registration, SourceError> {
            self.inner.register(ctx, mask, apply_markdown).await
        }

        async fn get_events(
            &self,
            ctx: &ClientContext,
            queue_id: &QueueId,
            last_event_id: EventId,
            blocking: bool,
        ) -> Result<Vec<Event>, SourceError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("event source blew up");
            }
            self.inner.get_events(ctx, queue_id, last_event_id, blocking).await
        }
    }

    fn manager(source: &Arc<ScriptedSource>) -> (SessionManager<ScriptedSource>, OutputReceiver) {
        SessionManager::new(source.clone(), SessionConfig::default())
    }

    #[tokio::test]
    async fn streams_message_then_stops_cleanly() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_registration(registration("Q1", 0))
                .with_batch(Ok(vec![Event::message(1, stream_message(1))])),
        );
        let (manager, mut rx) = manager(&source);
        let handle = manager.start(ctx()).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(NormalizedOutput::StatusNote(
                "Queue Q1 obtained, waiting for messages...".into()
            ))
        );
        assert_eq!(
            rx.recv().await,
            Some(NormalizedOutput::IncomingMessage(stream_message(1)))
        );
        assert_eq!(handle.state(), SupervisorState::Polling);

        source.wait_for_fetches(2).await;
        handle.stop().await;

        assert_eq!(handle.state(), SupervisorState::Closed);
        assert_eq!(source.fetch_calls()[1], (QueueId::new("Q1"), 1));
        assert_eq!(source.aborted(), 1);
        let rest = drain(&mut rx);
        assert!(
            rest.iter()
                .all(|o| !matches!(o, NormalizedOutput::IncomingMessage(_)) && !o.is_failure()),
            "unexpected output after stop: {rest:?}"
        );
    }

    #[tokio::test]
    async fn registration_failure_reports_once_and_goes_idle() {
        let source = Arc::new(ScriptedSource::new().with_registration(Err(SourceError::Api {
            result: "error".into(),
            msg: "Invalid API key".into(),
        })));
        let (manager, mut rx) = manager(&source);

        let handle = manager.start(ctx()).unwrap();
        handle.finished().await;

        assert_eq!(handle.state(), SupervisorState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![NormalizedOutput::Failure(
                "Cannot register: API call returned error: Invalid API key".into()
            )]
        );
        assert!(source.fetch_calls().is_empty());

        // A fresh start is a new attempt.
        let retry = manager.start(ctx()).unwrap();
        let note = rx.recv().await.unwrap();
        assert!(matches!(note, NormalizedOutput::StatusNote(text) if text.starts_with("Queue ")));
        retry.stop().await;
        assert_eq!(retry.state(), SupervisorState::Closed);
        assert_eq!(source.register_calls().len(), 2);
    }

    #[tokio::test]
    async fn transient_fetch_error_re_registers() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_registration(registration("Q1", 0))
                .with_batch(Err(SourceError::Transport("connection reset by peer".into())))
                .with_registration(registration("Q2", 5)),
        );
        let (manager, mut rx) = manager(&source);
        let handle = manager.start(ctx()).unwrap();

        source.wait_for_fetches(2).await;
        assert_eq!(
            source.fetch_calls(),
            vec![(QueueId::new("Q1"), 0), (QueueId::new("Q2"), 5)]
        );
        handle.stop().await;

        let outputs = drain(&mut rx);
        assert_eq!(
            outputs[..3],
            [
                NormalizedOutput::StatusNote("Queue Q1 obtained, waiting for messages...".into()),
                NormalizedOutput::Failure("transport error: connection reset by peer".into()),
                NormalizedOutput::StatusNote("Queue Q2 obtained, waiting for messages...".into()),
            ]
        );
        assert_eq!(outputs.iter().filter(|o| o.is_failure()).count(), 1);
        assert_eq!(source.register_calls().len(), 2);
    }

    #[tokio::test]
    async fn stop_while_registering_aborts_register() {
        let source = Arc::new(ScriptedSource::new().with_held_registration());
        let (manager, mut rx) = manager(&source);
        let handle = manager.start(ctx()).unwrap();
        assert_eq!(handle.state(), SupervisorState::Registering);

        source.wait_for_registrations(1).await;
        timeout(Duration::from_secs(1), handle.stop()).await.unwrap();

        assert_eq!(handle.state(), SupervisorState::Closed);
        assert_eq!(source.aborted(), 1);
        assert!(source.fetch_calls().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let source = Arc::new(ScriptedSource::new());
        let (manager, _rx) = manager(&source);
        let handle = manager.start(ctx()).unwrap();

        source.wait_for_fetches(1).await;
        handle.stop().await;
        handle.stop().await;
        assert_eq!(handle.state(), SupervisorState::Closed);
        assert_eq!(source.aborted(), 1);
    }

    #[tokio::test]
    async fn stop_is_not_blocked_by_full_output() {
        let batch = (1..=4_i64)
            .map(|id| Event::message(id, stream_message(id.unsigned_abs())))
            .collect();
        let source = Arc::new(
            ScriptedSource::new()
                .with_registration(registration("Q1", 0))
                .with_batch(Ok(batch)),
        );
        let (manager, _rx) =
            SessionManager::new(source.clone(), SessionConfig::default().with_output_capacity(1));
        let handle = manager.start(ctx()).unwrap();

        source.wait_for_fetches(1).await;
        timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
        assert_eq!(handle.state(), SupervisorState::Closed);
    }

    #[tokio::test]
    async fn panicking_fetcher_is_reported_before_re_registering() {
        let source = Arc::new(PanicsOnFirstFetch {
            inner: ScriptedSource::new(),
            panicked: AtomicBool::new(false),
        });
        let (manager, mut rx) = SessionManager::new(source.clone(), SessionConfig::default());
        let handle = manager.start(ctx()).unwrap();

        // The first fetch panics without reaching the scripted source.
        timeout(Duration::from_secs(1), source.inner.wait_for_fetches(1))
            .await
            .unwrap();
        handle.stop().await;

        assert_eq!(handle.state(), SupervisorState::Closed);
        assert_eq!(source.inner.register_calls().len(), 2);
        let failures: Vec<_> = drain(&mut rx).into_iter().filter(|o| o.is_failure()).collect();
        assert_eq!(failures.len(), 1, "{failures:?}");
        assert!(matches!(
            &failures[0],
            NormalizedOutput::Failure(text) if text.starts_with("Fetcher task failed: ")
        ));
    }

    #[tokio::test]
    async fn dropping_handle_stops_session() {
        let source = Arc::new(ScriptedSource::new());
        let (manager, _rx) = manager(&source);
        let handle = manager.start(ctx()).unwrap();
        source.wait_for_fetches(1).await;

        drop(handle);

        timeout(Duration::from_secs(1), async {
            while source.aborted() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
