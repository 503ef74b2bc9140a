//! Session error types.

use clisiana_core::{OutgoingError, OutputError, SourceError};

use crate::state::{SupervisorSignal, SupervisorState};

/// Session error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot apply {signal:?} while supervisor is {state:?}")]
    InvalidTransition {
        state: SupervisorState,
        signal: SupervisorSignal,
    },
    #[error("Invalid outgoing message: {0}")]
    Outgoing(#[from] OutgoingError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}
