//! Scripted in-memory event source.

use std::{
    collections::VecDeque,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use clisiana_core::{
    ClientContext, Event, EventId, EventMask, EventSource, MessageSender, OutgoingMessage,
    QueueId, Registration, SourceError, wire,
};
use tokio::sync::watch;
use uuid::Uuid;

/// One scripted reply. `Hold` never resolves, like a long-poll with no traffic.
#[derive(Debug)]
enum Step<T> {
    Reply(Result<T, SourceError>),
    Hold,
}

/// Event source that replays queued replies.
///
/// Useful for tests, demos and offline development. Every call is recorded.
/// Once a script runs dry, `register` hands out a fresh queue and
/// `get_events` blocks until the caller gives up on it.
pub struct ScriptedSource {
    registrations: Mutex<VecDeque<Step<Registration>>>,
    batches: Mutex<VecDeque<Step<Vec<Event>>>>,
    sends: Mutex<VecDeque<Result<u64, SourceError>>>,
    probe: Mutex<Result<(), SourceError>>,
    register_calls: watch::Sender<Vec<EventMask>>,
    fetch_calls: watch::Sender<Vec<(QueueId, EventId)>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    aborted: AtomicUsize,
    next_message_id: AtomicU64,
}

impl ScriptedSource {
    /// Create a source with empty scripts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(VecDeque::new()),
            batches: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            probe: Mutex::new(Ok(())),
            register_calls: watch::Sender::new(Vec::new()),
            fetch_calls: watch::Sender::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            aborted: AtomicUsize::new(0),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Queue the reply to the next `register` call.
    #[must_use]
    pub fn with_registration(self, reply: Result<Registration, SourceError>) -> Self {
        lock(&self.registrations).push_back(Step::Reply(reply));
        self
    }

    /// Make the next `register` call hang until dropped.
    #[must_use]
    pub fn with_held_registration(self) -> Self {
        lock(&self.registrations).push_back(Step::Hold);
        self
    }

    /// Queue the reply to the next `get_events` call.
    #[must_use]
    pub fn with_batch(self, reply: Result<Vec<Event>, SourceError>) -> Self {
        lock(&self.batches).push_back(Step::Reply(reply));
        self
    }

    /// Queue a captured JSON register reply, decoded as a transport would.
    #[must_use]
    pub fn with_registration_json(self, body: &str) -> Self {
        self.with_registration(wire::decode_register(body))
    }

    /// Queue a captured JSON events reply.
    #[must_use]
    pub fn with_batch_json(self, body: &str) -> Self {
        self.with_batch(wire::decode_events(body))
    }

    /// Queue a captured JSON send-message reply.
    #[must_use]
    pub fn with_send_json(self, body: &str) -> Self {
        self.with_send(wire::decode_send(body))
    }

    /// Queue the reply to the next `send_message` call.
    #[must_use]
    pub fn with_send(self, reply: Result<u64, SourceError>) -> Self {
        lock(&self.sends).push_back(reply);
        self
    }

    /// Set what `probe` returns.
    #[must_use]
    pub fn with_probe(self, reply: Result<(), SourceError>) -> Self {
        *lock(&self.probe) = reply;
        self
    }

    /// Event masks passed to `register`, in call order.
    #[must_use]
    pub fn register_calls(&self) -> Vec<EventMask> {
        self.register_calls.borrow().clone()
    }

    /// `(queue, cursor)` pairs passed to `get_events`, in call order.
    #[must_use]
    pub fn fetch_calls(&self) -> Vec<(QueueId, EventId)> {
        self.fetch_calls.borrow().clone()
    }

    /// Messages accepted by `send_message`.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }

    /// Calls dropped by the caller before they completed.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Wait until `register` has been called at least `n` times.
    pub async fn wait_for_registrations(&self, n: usize) {
        let mut rx = self.register_calls.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|calls| calls.len() >= n).await;
    }

    /// Wait until `get_events` has been called at least `n` times.
    pub async fn wait_for_fetches(&self, n: usize) {
        let mut rx = self.fetch_calls.subscribe();
        let _ = rx.wait_for(|calls| calls.len() >= n).await;
    }

    async fn hold(&self) -> SourceError {
        let _guard = InFlight {
            aborted: &self.aborted,
        };
        std::future::pending::<()>().await;
        SourceError::Canceled
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts a call as aborted when its future is dropped mid-flight.
struct InFlight<'a> {
    aborted: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn register(
        &self,
        _ctx: &ClientContext,
        mask: EventMask,
        _apply_markdown: bool,
    ) -> Result<Registration, SourceError> {
        self.register_calls.send_modify(|calls| calls.push(mask));
        let step = lock(&self.registrations).pop_front();
        match step {
            Some(Step::Reply(reply)) => reply,
            Some(Step::Hold) => Err(self.hold().await),
            None => Ok(Registration {
                queue_id: QueueId::new(Uuid::new_v4().to_string()),
                last_event_id: -1,
            }),
        }
    }

    async fn get_events(
        &self,
        _ctx: &ClientContext,
        queue_id: &QueueId,
        last_event_id: EventId,
        _blocking: bool,
    ) -> Result<Vec<Event>, SourceError> {
        self.fetch_calls
            .send_modify(|calls| calls.push((queue_id.clone(), last_event_id)));
        let step = lock(&self.batches).pop_front();
        match step {
            Some(Step::Reply(reply)) => reply,
            Some(Step::Hold) | None => Err(self.hold().await),
        }
    }

    async fn probe(&self, _ctx: &ClientContext) -> Result<(), SourceError> {
        lock(&self.probe).clone()
    }
}

#[async_trait]
impl MessageSender for ScriptedSource {
    async fn send_message(
        &self,
        _ctx: &ClientContext,
        message: &OutgoingMessage,
    ) -> Result<u64, SourceError> {
        let reply = lock(&self.sends)
            .pop_front()
            .unwrap_or_else(|| Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst)));
        if reply.is_ok() {
            lock(&self.sent).push(message.clone());
        }
        reply
    }
}
