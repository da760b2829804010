use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Position of a member in the token handler's state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// No token
    Idle,

    /// Token present, decision pending
    Holding,

    /// Doing exclusive work
    InCriticalSection,

    /// Handing the token to the successor
    Forwarding,
}

/// Process-local request to use the critical section on next token
/// possession. All clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct Intent(Arc<AtomicBool>);

impl Intent {
    /// Records a pending request.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Reads and clears the request in one step.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
