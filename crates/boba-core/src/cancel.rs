//! Tri-state cancellation latch shared by the cancelable input readers.

use std::sync::atomic::{AtomicU8, Ordering};

const ACTIVE: u8 = 0;
const REQUESTED: u8 = 1;
const ACKNOWLEDGED: u8 = 2;

/// Thread-safe "has this operation been cancelled" latch.
///
/// The flag moves through three states:
///
/// 1. *active* -- no cancellation has been requested.
/// 2. *cancel-requested* -- [`set_cancelled`](CancelFlag::set_cancelled) has
///    been called at least once.
/// 3. *acknowledged* -- the read loop observed the request and drained the
///    wake signal.
///
/// Transitions only move forward. Once [`is_cancelled`](CancelFlag::is_cancelled)
/// returns `true` on any thread it returns `true` on every thread.
#[derive(Debug, Default)]
pub struct CancelFlag {
    state: AtomicU8,
}

impl CancelFlag {
    /// Create a flag in the *active* state.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Request cancellation.
    ///
    /// Returns `true` for the call that performed the *active* to
    /// *cancel-requested* transition and `false` for every later call.
    pub fn set_cancelled(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, REQUESTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) != ACTIVE
    }

    /// Mark a pending request as observed by the read loop.
    ///
    /// Has no effect unless cancellation was requested first.
    pub fn acknowledge(&self) {
        let _ = self.state.compare_exchange(
            REQUESTED,
            ACKNOWLEDGED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Returns `true` once the read loop has acknowledged the cancellation.
    pub fn is_acknowledged(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACKNOWLEDGED
    }
}
