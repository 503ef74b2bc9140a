//! Fetch error classification.
//!
//! There are only two classes. A cancellation is our own stop signal aborting
//! the in-flight long-poll and is swallowed. Anything else is transient: it is
//! reported once and answered with exactly one immediate re-registration.
//! Registration failures never pass through here; they end the attempt.

use clisiana_core::SourceError;

/// How the fetch loop reacts to a failed `get_events` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected during shutdown; exit quietly.
    Cancellation,
    /// Report, then ask the supervisor for a fresh queue.
    Transient,
}

/// Classify a failed fetch.
#[must_use]
pub fn classify(err: &SourceError) -> ErrorClass {
    if err.is_cancellation() {
        ErrorClass::Cancellation
    } else {
        ErrorClass::Transient
    }
}
