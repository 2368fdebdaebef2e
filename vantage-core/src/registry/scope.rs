//! Ignore Scope
//!
//! While the tool builds its own objects, the notifications those objects
//! raise must not reach the registry. An [`IgnoreScope`] marks the current
//! thread as "building tool internals" until the guard is dropped.
//!
//! # Implementation
//!
//! A thread-local depth counter. Scopes nest, and each thread has its own
//! counter, so entering a scope never affects notifications raised by the
//! target's threads.

use std::cell::Cell;

thread_local! {
    static IGNORE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Guard that re-enables tracking for this thread when dropped.
#[must_use = "the scope ends when the guard is dropped"]
pub struct IgnoreScope {
    // Not Send: the guard must be dropped on the thread that entered it.
    _not_send: std::marker::PhantomData<*const ()>,
}

impl IgnoreScope {
    /// Ignore notifications raised by the calling thread until the returned
    /// guard is dropped.
    pub fn enter() -> Self {
        IGNORE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }

    /// Whether the calling thread is inside an ignore scope.
    pub fn is_active() -> bool {
        IGNORE_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for IgnoreScope {
    fn drop(&mut self) {
        IGNORE_DEPTH.with(|depth| {
            let current = depth.get();
            debug_assert!(current > 0, "IgnoreScope depth underflow");
            depth.set(current.saturating_sub(1));
        });
    }
}
