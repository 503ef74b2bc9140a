//! Long-poll event-stream sessions for the clisiana client.
//!
//! Provides:
//! - `SessionManager` / `SessionHandle` - Start and stop sessions
//! - Supervisor and fetcher tasks that keep one event queue alive
//! - `send_outgoing` / `ping` - One-shot commands sharing the output channel
//! - Event source implementations (scripted)

pub mod actions;
pub mod classify;
pub mod config;
pub mod error;
pub mod manager;
pub mod source;
pub mod state;

mod fetcher;
mod session;
mod supervisor;

pub use actions::{ping, send_outgoing, spawn_send};
pub use classify::{ErrorClass, classify};
pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::{SessionHandle, SessionManager};
pub use state::{SupervisorSignal, SupervisorState, SupervisorStateMachine};
