//! Queue lifecycle: register, poll, re-register on transient failure, close.

use std::sync::Arc;

use clisiana_core::{ClientContext, EventSource, NormalizedOutput, OutputSender};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::SessionConfig,
    fetcher::{Fetcher, FetcherExit},
    session::Session,
    state::{SupervisorSignal, SupervisorState, SupervisorStateMachine},
};

/// Drives one [`SupervisorStateMachine`] from `Registering` to a settled state.
///
/// Owns at most one fetcher task at a time. A fetcher gets a child of the
/// supervisor's stop token, so a stop request reaches both.
pub(crate) struct Supervisor<S: EventSource + ?Sized> {
    source: Arc<S>,
    ctx: Arc<ClientContext>,
    output: OutputSender,
    config: SessionConfig,
    stop: CancellationToken,
    machine: SupervisorStateMachine,
    state_tx: watch::Sender<SupervisorState>,
    generation: u64,
}

impl<S: EventSource + ?Sized + 'static> Supervisor<S> {
    /// `machine` must already have accepted `Start`.
    pub(crate) const fn new(
        source: Arc<S>,
        ctx: Arc<ClientContext>,
        output: OutputSender,
        config: SessionConfig,
        stop: CancellationToken,
        machine: SupervisorStateMachine,
        state_tx: watch::Sender<SupervisorState>,
    ) -> Self {
        Self {
            source,
            ctx,
            output,
            config,
            stop,
            machine,
            state_tx,
            generation: 0,
        }
    }

    #[tracing::instrument(name = "supervisor", skip_all, fields(api_base = %self.ctx.api_base))]
    pub(crate) async fn run(mut self) {
        loop {
            debug!(event_types = ?self.config.event_mask.type_names(), "Registering event queue");
            let registered = tokio::select! {
                biased;
                () = self.stop.cancelled() => None,
                result = self.source.register(
                    &self.ctx,
                    self.config.event_mask,
                    self.config.apply_markdown,
                ) => Some(result),
            };

            let registration = match registered {
                None => {
                    debug!("Stop requested while registering");
                    self.close(None).await;
                    return;
                }
                Some(Err(err)) => {
                    warn!("Cannot register: {err}");
                    self.emit(NormalizedOutput::Failure(format!("Cannot register: {err}")))
                        .await;
                    if self.stop.is_cancelled() {
                        self.close(None).await;
                    } else {
                        self.transition(SupervisorSignal::RegistrationFailed);
                    }
                    return;
                }
                Some(Ok(registration)) => registration,
            };

            self.generation += 1;
            let session = Session::new(registration, self.generation);
            info!(
                generation = self.generation,
                queue_id = %session.queue_id(),
                cursor = session.cursor(),
                "Queue registered"
            );
            self.transition(SupervisorSignal::Registered);

            let note = format!("Queue {} obtained, waiting for messages...", session.queue_id());
            if !self.emit(NormalizedOutput::StatusNote(note)).await {
                self.close(None).await;
                return;
            }

            let fetcher_stop = self.stop.child_token();
            let mut task = tokio::spawn(
                Fetcher::new(
                    session,
                    Arc::clone(&self.source),
                    Arc::clone(&self.ctx),
                    self.output.clone(),
                    fetcher_stop.clone(),
                    self.config.emit_heartbeats,
                )
                .run(),
            );

            let joined = tokio::select! {
                biased;
                () = self.stop.cancelled() => None,
                joined = &mut task => Some(joined),
            };

            match joined {
                None => {
                    self.close(Some(task)).await;
                    return;
                }
                Some(Ok(FetcherExit::Restart)) => {
                    self.restart(&fetcher_stop);
                }
                Some(Err(e)) => {
                    error!("Fetcher task failed: {e}");
                    let failure = NormalizedOutput::Failure(format!("Fetcher task failed: {e}"));
                    if !self.emit(failure).await {
                        self.close(None).await;
                        return;
                    }
                    self.restart(&fetcher_stop);
                }
                Some(Ok(exit)) => {
                    debug!(?exit, "Fetcher exited");
                    self.close(None).await;
                    return;
                }
            }
        }
    }

    /// Discard the finished generation and go back to `Registering`.
    fn restart(&mut self, fetcher_stop: &CancellationToken) {
        self.transition(SupervisorSignal::FetchFailed);
        fetcher_stop.cancel();
        info!(generation = self.generation, "Re-registering event queue");
        self.transition(SupervisorSignal::Retry);
    }

    /// Enter `Closing`, wait for the fetcher if there is one, then `Closed`.
    async fn close(&mut self, task: Option<tokio::task::JoinHandle<FetcherExit>>) {
        self.transition(SupervisorSignal::Stop);
        if let Some(task) = task {
            match task.await {
                Ok(exit) => debug!(?exit, "Fetcher acknowledged stop"),
                Err(e) => error!("Fetcher task failed: {e}"),
            }
        }
        self.transition(SupervisorSignal::FetcherExited);
        info!("Session closed");
    }

    /// Write to the output channel unless stop fires first.
    async fn emit(&self, output: NormalizedOutput) -> bool {
        tokio::select! {
            biased;
            () = self.stop.cancelled() => false,
            sent = self.output.emit(output) => sent.is_ok(),
        }
    }

    fn transition(&mut self, signal: SupervisorSignal) {
        match self.machine.apply(signal) {
            Ok(state) => {
                debug!(?signal, ?state, "Supervisor transition");
                self.state_tx.send_replace(state);
            }
            Err(e) => error!("{e}"),
        }
    }
}
