//! Long-poll loop for one session generation.
//!
//! Every write to the output channel races the stop token, so a stopped
//! fetcher never waits on a slow consumer. The "closing" note is the one
//! value that may be skipped: it is only written when the channel has room.
//! It only appears when stop lands between two requests; a stop that aborts
//! a request or a pending write exits as [`FetcherExit::Canceled`] without it.

use std::sync::Arc;

use clisiana_core::{
    ClientContext, Event, EventKind, EventSource, NormalizedOutput, OutputSender, SourceError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    classify::{ErrorClass, classify},
    session::Session,
};

/// Why a fetcher returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetcherExit {
    /// The stop check fired before a request was issued.
    Stopped,
    /// The in-flight request was aborted by stop.
    Canceled,
    /// A transient error was reported; the supervisor should re-register.
    Restart,
    /// Nobody is reading output any more.
    OutputClosed,
}

pub(crate) struct Fetcher<S: EventSource + ?Sized> {
    session: Session,
    source: Arc<S>,
    ctx: Arc<ClientContext>,
    output: OutputSender,
    stop: CancellationToken,
    emit_heartbeats: bool,
}

impl<S: EventSource + ?Sized> Fetcher<S> {
    pub(crate) const fn new(
        session: Session,
        source: Arc<S>,
        ctx: Arc<ClientContext>,
        output: OutputSender,
        stop: CancellationToken,
        emit_heartbeats: bool,
    ) -> Self {
        Self {
            session,
            source,
            ctx,
            output,
            stop,
            emit_heartbeats,
        }
    }

    #[tracing::instrument(
        name = "fetcher",
        skip_all,
        fields(generation = self.session.generation(), queue_id = %self.session.queue_id())
    )]
    pub(crate) async fn run(mut self) -> FetcherExit {
        loop {
            if self.stop.is_cancelled() {
                debug!("Stop requested, fetcher closing");
                if let Err(e) = self
                    .output
                    .try_emit(NormalizedOutput::StatusNote("closing".into()))
                {
                    debug!("Closing note not delivered: {e}");
                }
                return FetcherExit::Stopped;
            }

            trace!(cursor = self.session.cursor(), "Polling for events");
            let result = tokio::select! {
                biased;
                () = self.stop.cancelled() => Err(SourceError::Canceled),
                result = self.source.get_events(
                    &self.ctx,
                    self.session.queue_id(),
                    self.session.cursor(),
                    true,
                ) => result,
            };

            match result {
                Ok(events) => {
                    if let Some(exit) = self.process(events).await {
                        return exit;
                    }
                }
                Err(err) => match classify(&err) {
                    ErrorClass::Cancellation => {
                        debug!("In-flight request canceled");
                        return FetcherExit::Canceled;
                    }
                    ErrorClass::Transient => {
                        warn!("Fetching events failed: {err}");
                        return self
                            .deliver(NormalizedOutput::Failure(err.to_string()))
                            .await
                            .unwrap_or(FetcherExit::Restart);
                    }
                },
            }
        }
    }

    async fn process(&mut self, events: Vec<Event>) -> Option<FetcherExit> {
        trace!(count = events.len(), "Received events");
        for Event { id, kind } in events {
            self.session.advance(id);
            let output = match kind {
                EventKind::Message(message) => NormalizedOutput::IncomingMessage(message),
                EventKind::Heartbeat if self.emit_heartbeats => {
                    NormalizedOutput::StatusNote("heartbeat".into())
                }
                EventKind::Heartbeat => {
                    trace!(id, "Heartbeat");
                    continue;
                }
                EventKind::Unsupported { tag } => {
                    warn!(id, %tag, "Skipping unsupported event");
                    NormalizedOutput::Failure(format!("unsupported event: {tag}"))
                }
            };
            if let Some(exit) = self.deliver(output).await {
                return Some(exit);
            }
        }
        None
    }

    /// Write to the output channel unless stop fires first.
    async fn deliver(&self, output: NormalizedOutput) -> Option<FetcherExit> {
        tokio::select! {
            biased;
            () = self.stop.cancelled() => Some(FetcherExit::Canceled),
            sent = self.output.emit(output) => sent.err().map(|_| FetcherExit::OutputClosed),
        }
    }
}
