//! Session tuning.

use clisiana_core::{DEFAULT_OUTPUT_CAPACITY, EventMask};

/// Options applied to every queue a [`SessionManager`](crate::SessionManager)
/// registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Event types requested at registration. Empty means all types.
    pub event_mask: EventMask,
    /// Ask the server to render message content as HTML.
    pub apply_markdown: bool,
    /// Capacity of the output channel created by
    /// [`SessionManager::new`](crate::SessionManager::new).
    pub output_capacity: usize,
    /// Report heartbeats as status notes instead of only tracing them.
    pub emit_heartbeats: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_mask: EventMask::MESSAGE,
            apply_markdown: false,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            emit_heartbeats: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn with_event_mask(mut self, mask: EventMask) -> Self {
        self.event_mask = mask;
        self
    }

    #[must_use]
    pub const fn with_heartbeats(mut self, enabled: bool) -> Self {
        self.emit_heartbeats = enabled;
        self
    }

    #[must_use]
    pub const fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }
}
