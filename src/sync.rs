//! Reentrant device lock
//!
//! Each device guards its buffer state with a lock that the same thread may
//! acquire recursively, so a higher-level operation holding the lock can
//! call into a lower-level one without deadlocking itself. The guard
//! releases on every exit path.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;

/// A reentrant mutual-exclusion lock around mutable state.
///
/// Reentrancy applies to the lock itself: [`lock`](Self::lock) may be
/// nested on one thread. Mutable access goes through [`with`](Self::with),
/// which takes a single exclusive borrow for the duration of the closure;
/// nested same-thread mutation is structured as locked-core helper
/// functions called from within one `with` scope rather than by borrowing
/// the state twice.
pub struct Reentrant<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> Reentrant<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// Acquire the lock, returning a scoped guard.
    ///
    /// The same thread may call this again while the guard is live.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<T>> {
        self.inner.lock()
    }

    /// Acquire the lock and run `f` with exclusive access to the state.
    ///
    /// Must not be nested on the same lock from within `f`; use a
    /// locked-core helper taking `&mut T` instead.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }
}
