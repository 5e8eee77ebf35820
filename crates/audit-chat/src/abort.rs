//! Cancellation handle shared between a stream owner and its reader task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

const LIVE: u8 = 0;
const ABORTED: u8 = 1;
const FINISHED: u8 = 2;

/// A stream settles exactly once, either aborted or finished.
#[derive(Debug, Default)]
struct AbortState {
    phase: AtomicU8,
    notify: Notify,
}

impl AbortState {
    fn settle(&self, phase: u8) -> bool {
        self.phase
            .compare_exchange(LIVE, phase, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Abort signal observed by the task reading a stream.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.state.phase.load(Ordering::Acquire) == ABORTED
    }

    /// Resolves once the owning controller aborts.
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Mark the stream as ended on its own; later aborts become no-ops.
    ///
    /// Returns `false` when an abort got there first, in which case the
    /// stream must be reported as cancelled.
    pub fn finish(&self) -> bool {
        self.state.settle(FINISHED)
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase.load(Ordering::Acquire) == FINISHED
    }
}

/// Abort controller that owns the underlying signal.
#[derive(Clone, Debug)]
pub struct AbortController {
    signal: AbortSignal,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                state: Arc::new(AbortState::default()),
            },
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort the stream. Returns `false` when it was already aborted or has
    /// finished.
    pub fn abort(&self) -> bool {
        let first = self.signal.state.settle(ABORTED);
        if first {
            self.signal.state.notify.notify_waiters();
        }
        first
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}
