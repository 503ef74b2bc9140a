//! One generation of a registered event queue.

use clisiana_core::{EventId, QueueId, Registration};

/// Queue id, cursor and generation of a single registration.
///
/// Created by the supervisor on every (re)registration and moved into exactly
/// one fetcher. The cursor never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    queue_id: QueueId,
    cursor: EventId,
    generation: u64,
}

impl Session {
    pub(crate) fn new(registration: Registration, generation: u64) -> Self {
        Self {
            queue_id: registration.queue_id,
            cursor: registration.last_event_id,
            generation,
        }
    }

    pub(crate) const fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    pub(crate) const fn cursor(&self) -> EventId {
        self.cursor
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    /// Acknowledge an event id.
    pub(crate) fn advance(&mut self, event_id: EventId) {
        self.cursor = self.cursor.max(event_id);
    }
}
