//! Cancellation primitives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A type whose in-flight work can be canceled.
///
/// Implementations must make `cancel` idempotent: calling it more than once,
/// or after the work has already finished, is a no-op.
pub trait Cancelable: Send + Sync {
    /// Cancel the work.
    fn cancel(&self);
}

impl<C: Cancelable + ?Sized> Cancelable for Arc<C> {
    fn cancel(&self) {
        (**self).cancel();
    }
}

impl<C: Cancelable + ?Sized> Cancelable for Box<C> {
    fn cancel(&self) {
        (**self).cancel();
    }
}

/// A token for cooperative cancellation.
///
/// Clones share the same state, so canceling one clone is observed by all.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// token was already cancelled.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}

impl Cancelable for CancellationToken {
    fn cancel(&self) {
        CancellationToken::cancel(self);
    }
}
