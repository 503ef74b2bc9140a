use crate::error::SessionError;

/// Lifecycle state of a session supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No queue exists. Initial state, and where a failed registration lands.
    Idle,
    /// A `register()` call is in flight.
    Registering,
    /// A fetcher is long-polling the current queue.
    Polling,
    /// The fetcher hit a transient error; a new queue is about to be requested.
    Restarting,
    /// Stop was requested; waiting for the fetcher to exit.
    Closing,
    /// Terminal. All channels released.
    Closed,
}

impl SupervisorState {
    /// Whether the supervisor task has nothing left to do in this state.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

/// Inputs that drive [`SupervisorStateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorSignal {
    Start,
    Registered,
    RegistrationFailed,
    FetchFailed,
    Retry,
    Stop,
    FetcherExited,
}

#[derive(Debug, Clone)]
pub struct SupervisorStateMachine {
    state: SupervisorState,
}

impl Default for SupervisorStateMachine {
    fn default() -> Self {
        Self {
            state: SupervisorState::Idle,
        }
    }
}

impl SupervisorStateMachine {
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Feed one signal and return the resulting state.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidTransition` and leaves the state unchanged
    /// if the signal is not valid in the current state.
    pub fn apply(&mut self, signal: SupervisorSignal) -> Result<SupervisorState, SessionError> {
        use SupervisorSignal as Sig;
        use SupervisorState as St;

        let next = match (self.state, signal) {
            (St::Idle, Sig::Start) => St::Registering,
            (St::Registering, Sig::Registered) => St::Polling,
            (St::Registering, Sig::RegistrationFailed) => St::Idle,
            (St::Polling, Sig::FetchFailed) => St::Restarting,
            (St::Restarting, Sig::Retry) => St::Registering,
            (St::Registering | St::Polling | St::Restarting, Sig::Stop) => St::Closing,
            (St::Closing, Sig::FetcherExited) => St::Closed,
            // Stopping is idempotent and legal from anywhere.
            (St::Idle | St::Closing | St::Closed, Sig::Stop) => self.state,
            (state, signal) => return Err(SessionError::InvalidTransition { state, signal }),
        };

        self.state = next;
        Ok(next)
    }
}
