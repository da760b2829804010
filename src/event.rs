//! # Summary
//!
//! Observable protocol steps. Each member reports what it does with the
//! token to an optional observer channel, which is how the harness-free
//! tests reconstruct a global order of receives, sends and critical
//! sections across the ring.

use tokio::time::Instant;

use crate::internal;
use crate::message::Token;
use crate::state::Status;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `id` took ownership of the token from `from`
    Received { id: usize, from: usize, sequence: u64, at: Instant },

    /// `from` handed the token to its transport for `to`
    Sent { from: usize, to: usize, sequence: u64, at: Instant },

    /// `id`'s intent generator asked for the critical section
    Wanted { id: usize, at: Instant },

    Entered { id: usize, at: Instant },

    Exited { id: usize, at: Instant },

    /// `id` was handed a second token while not idle
    Violation { id: usize, status: Status, token: Token, at: Instant },

    /// `id` failed to forward to `to` and stopped
    Stalled { id: usize, to: usize, at: Instant },
}

impl Event {
    /// When the event happened.
    pub fn at(&self) -> Instant {
        match self {
        | Event::Received { at, .. }
        | Event::Sent { at, .. }
        | Event::Wanted { at, .. }
        | Event::Entered { at, .. }
        | Event::Exited { at, .. }
        | Event::Violation { at, .. }
        | Event::Stalled { at, .. } => *at,
        }
    }
}

/// Optional sink for events. Dropped receivers are ignored.
#[derive(Clone, Debug, Default)]
pub struct Observer(Option<internal::Tx<Event>>);

impl Observer {
    pub fn new(tx: internal::Tx<Event>) -> Self {
        Observer(Some(tx))
    }

    pub fn none() -> Self {
        Observer(None)
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.0 {
            tx.try_send(event);
        }
    }
}
