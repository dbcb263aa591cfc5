//! Cooperative cancellation of blocked pool operations.
//!
//! Threads have no interruption mechanism, so blocking pool calls accept a
//! [`CancelToken`]. While a caller is parked, the token holds a waker that
//! pokes the relevant condition variables; cancelling flips the shared flag
//! and runs the wakers, so the parked thread re-checks its predicate and
//! backs out.

use log::trace;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Waker = Box<dyn Fn() + Send + Sync>;

struct TokenInner {
    /// One-shot cancellation flag shared by all clones.
    cancelled: AtomicBool,

    /// Id source for watch registrations.
    next_watch_id: AtomicU64,

    /// Wakers for the waits currently watching this token.
    watchers: Mutex<Vec<(u64, Waker)>>,
}

/// A handle for cancelling blocked pool operations.
///
/// Clones share one flag: cancelling any clone cancels them all. A token is
/// one-shot; once cancelled it stays cancelled, and an operation handed a
/// cancelled token backs out before it ever parks.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                next_watch_id: AtomicU64::new(0),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancel every operation watching this token, now and in the future.
    ///
    /// Idempotent: only the first call runs the wakers.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let watchers = self.inner.watchers.lock();
        trace!("cancelling {} watched waits", watchers.len());
        for (_, waker) in watchers.iter() {
            waker();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a waker for the duration of a blocking wait.
    ///
    /// The waker must signal the wait's condition variable while holding its
    /// mutex, so a waiter that checked the flag and is about to park cannot
    /// miss the cancellation. Dropping the guard unregisters the waker.
    pub(crate) fn watch(&self, waker: impl Fn() + Send + Sync + 'static) -> WatchGuard {
        let id = self.inner.next_watch_id.fetch_add(1, Ordering::Relaxed);
        self.inner.watchers.lock().push((id, Box::new(waker)));

        WatchGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Unregisters a watched wait when the wait ends.
pub(crate) struct WatchGuard {
    inner: Arc<TokenInner>,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let mut watchers = self.inner.watchers.lock();
        if let Some(position) = watchers.iter().position(|(id, _)| *id == self.id) {
            let _ = watchers.swap_remove(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancellation_is_shared_across_clones() {
        let token = CancelToken::new();
        let copy = token.clone();

        copy.cancel();

        assert!(token.is_cancelled());
        assert!(copy.is_cancelled());
    }

    #[test]
    fn cancel_runs_registered_wakers_once() {
        let token = CancelToken::new();
        let wakes = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&wakes);
        let _watch = token.watch(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel(); // second call is a no-op

        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_watch_is_not_woken() {
        let token = CancelToken::new();
        let wakes = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&wakes);
        let watch = token.watch(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(watch);

        token.cancel();

        assert_eq!(wakes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn late_watch_sees_the_flag_instead_of_a_wake() {
        let token = CancelToken::new();
        token.cancel();

        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let _watch = token.watch(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // No wake arrives after the fact; a waiter must consult the flag
        // before parking.
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
        assert!(token.is_cancelled());
    }
}
