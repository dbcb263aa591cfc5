//! Exclusive checkout of pooled resources.
//!
//! [`ResourcePool`] hands each registered resource to at most one caller at
//! a time. Acquisition can block, block with a deadline, watch a
//! cancellation token, or fail fast; the member set can grow and shrink
//! while callers are active; shutdown comes in graceful (drain) and
//! immediate flavors, and a closed pool can be reopened.

use log::{debug, info, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::pool::resource::Resource;
use crate::sync::cancel::CancelToken;

/// Error returned when a resource cannot be acquired from the pool.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The pool is closed, or a graceful close is draining it.
    #[error("pool is not open")]
    NotOpen,

    /// No resource became idle before the deadline.
    #[error("timed out waiting for an idle resource")]
    Timeout,

    /// The wait was cancelled through a [`CancelToken`].
    #[error("wait for a resource was cancelled")]
    Cancelled,

    /// No resource was idle at the moment of a non-blocking probe.
    #[error("no idle resource available")]
    Exhausted,
}

/// Error returned when a resource cannot be released back to the pool.
///
/// The rejected value travels inside the error, so the caller keeps
/// ownership of it.
#[derive(Error, Debug)]
pub enum ReleaseError<R: fmt::Debug> {
    /// The resource is not registered: never added, or force-removed while
    /// it was checked out.
    #[error("resource is not registered with this pool")]
    Unknown(R),

    /// The resource is already idle in the pool (double release).
    #[error("resource is already idle in the pool")]
    AlreadyIdle(R),
}

/// Error returned when a resource cannot be added to the pool.
#[derive(Error, Debug)]
pub enum AddError<R: fmt::Debug> {
    /// A resource with the same key is already registered; the rejected
    /// value is handed back.
    #[error("a resource with this key is already registered")]
    AlreadyRegistered(R),
}

/// Error returned when a graceful removal cannot complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveError {
    /// No resource with this key is registered.
    #[error("no resource with this key is registered")]
    NotFound,

    /// The wait for the resource to come back was cancelled.
    #[error("wait for removal was cancelled")]
    Cancelled,
}

/// Error returned when a graceful close cannot complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseError {
    /// The drain wait was cancelled; the pool remains open.
    #[error("close was cancelled before the pool drained")]
    Cancelled,
}

/// Outcome of a forced removal.
#[derive(Debug)]
pub enum ForcedRemoval<R> {
    /// The resource was idle; the pool hands its value back.
    Idle(R),

    /// The resource was checked out. The pool forgets it at once; the
    /// holder's eventual release will report [`ReleaseError::Unknown`].
    InUse,

    /// No resource with this key was registered.
    Unknown,
}

impl<R> ForcedRemoval<R> {
    /// Whether the key was registered before the call.
    pub fn was_known(&self) -> bool {
        !matches!(self, ForcedRemoval::Unknown)
    }
}

/// A consistent snapshot of pool occupancy, taken under a single lock
/// acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    /// Number of registered resources, idle or checked out.
    pub registered: usize,

    /// Number of idle resources awaiting checkout.
    pub idle: usize,

    /// Number of resources currently checked out.
    pub in_use: usize,
}

/// Counters describing the operations a pool has served.
#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    /// Successful acquisitions.
    pub acquires: usize,

    /// Successful releases.
    pub releases: usize,

    /// Resources added after construction.
    pub adds: usize,

    /// Resources removed, gracefully or by force.
    pub removals: usize,

    /// Acquire deadlines that expired empty-handed.
    pub timeouts: usize,

    /// Blocking operations that were cancelled.
    pub cancellations: usize,
}

/// Registry tag for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Sitting in the idle queue.
    Idle,

    /// Checked out by some caller.
    CheckedOut,
}

/// Pool lifecycle flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closed,
}

/// Lifecycle, registry, and idle queue under one lock. Keeping them in a
/// single guarded unit is what makes dequeue-and-mark and mark-and-enqueue
/// indivisible steps.
struct PoolState<R: Resource> {
    lifecycle: Lifecycle,

    /// Graceful closers currently draining. While non-zero, new checkouts
    /// bounce so the drain can finish.
    closers: usize,

    /// Every known resource and whether it is idle or checked out.
    registry: HashMap<R::Key, EntryState>,

    /// Idle resource values in the order they became idle.
    idle: VecDeque<R>,
}

impl<R: Resource> PoolState<R> {
    fn in_use(&self) -> usize {
        self.registry
            .values()
            .filter(|tag| **tag == EntryState::CheckedOut)
            .count()
    }

    fn accepting(&self) -> bool {
        self.lifecycle == Lifecycle::Open && self.closers == 0
    }

    /// Pull the idle value with this key out of the queue. The caller has
    /// just seen an `Idle` tag for the key, so the value has to be present.
    fn take_idle(&mut self, key: &R::Key) -> R {
        let position = self
            .idle
            .iter()
            .position(|resource| resource.key() == *key)
            .expect("idle queue out of step with registry");
        self.idle
            .remove(position)
            .expect("position was found a moment ago")
    }
}

#[derive(Default)]
struct StatCounters {
    acquires: AtomicUsize,
    releases: AtomicUsize,
    adds: AtomicUsize,
    removals: AtomicUsize,
    timeouts: AtomicUsize,
    cancellations: AtomicUsize,
}

struct Shared<R: Resource> {
    /// Name used in log output.
    name: Option<String>,

    state: Mutex<PoolState<R>>,

    /// Signaled when a resource lands in the idle queue.
    available: Condvar,

    /// Signaled when a resource comes back or leaves the registry.
    returned: Condvar,

    stats: StatCounters,
}

/// A thread-safe pool of interchangeable resources, checked out exclusively.
///
/// The pool starts closed; call [`open`](Self::open) before acquiring.
/// Cloning produces another handle to the same pool, so it can be passed to
/// worker threads directly.
///
/// # Example
///
/// ```
/// use corral_pool::{ResourcePool, Token};
///
/// let pool = ResourcePool::with_resources([Token::new(), Token::new()]);
/// pool.open();
///
/// let held = pool.acquire().unwrap();
/// assert_eq!(pool.available_count(), 1);
/// pool.release(held).unwrap();
/// assert_eq!(pool.available_count(), 2);
/// ```
pub struct ResourcePool<R: Resource> {
    shared: Arc<Shared<R>>,
}

impl<R: Resource> Clone for ResourcePool<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Resource> Default for ResourcePool<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.shared.name)
            .field("open", &self.is_open())
            .field("counts", &self.counts())
            .finish()
    }
}

impl<R: Resource> ResourcePool<R> {
    /// Create an empty pool. The pool starts closed.
    pub fn new() -> Self {
        Self::build(None, Vec::new())
    }

    /// Create an empty pool whose name appears in log output.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()), Vec::new())
    }

    /// Create a pool seeded with the given resources, all idle. The pool
    /// still starts closed. Seed resources with duplicate keys are skipped.
    pub fn with_resources<I>(resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        Self::build(None, resources.into_iter().collect())
    }

    fn build(name: Option<String>, resources: Vec<R>) -> Self {
        let mut registry = HashMap::new();
        let mut idle = VecDeque::new();

        for resource in resources {
            let key = resource.key();
            if registry.contains_key(&key) {
                warn!("skipping seed resource with duplicate key {:?}", key);
                continue;
            }
            registry.insert(key, EntryState::Idle);
            idle.push_back(resource);
        }

        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(PoolState {
                    lifecycle: Lifecycle::Closed,
                    closers: 0,
                    registry,
                    idle,
                }),
                available: Condvar::new(),
                returned: Condvar::new(),
                stats: StatCounters::default(),
            }),
        }
    }

    fn label(&self) -> &str {
        self.shared.name.as_deref().unwrap_or("resource-pool")
    }

    /// Waker handed to a [`CancelToken`]: taking the state lock before
    /// signalling guarantees a waiter that already checked the flag and is
    /// about to park cannot miss the wake.
    fn waker(&self) -> impl Fn() + Send + Sync + 'static {
        let shared = Arc::clone(&self.shared);
        move || {
            let _state = shared.state.lock();
            shared.available.notify_all();
            shared.returned.notify_all();
        }
    }

    /// Open the pool for acquisition. Idempotent; the registry and queue are
    /// untouched.
    pub fn open(&self) {
        let mut state = self.shared.state.lock();
        if state.lifecycle != Lifecycle::Open {
            state.lifecycle = Lifecycle::Open;
            info!("{}: opened", self.label());
        }
    }

    /// Whether the pool is currently open.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().lifecycle == Lifecycle::Open
    }

    /// Close the pool immediately, regardless of outstanding checkouts.
    ///
    /// The registry and queue are untouched: resources still checked out
    /// stay known to the pool and may be released normally afterwards.
    /// Blocked acquirers wake and report [`AcquireError::NotOpen`].
    pub fn close_now(&self) {
        let mut state = self.shared.state.lock();
        if state.lifecycle != Lifecycle::Closed {
            state.lifecycle = Lifecycle::Closed;
            info!(
                "{}: force closed with {} resources checked out",
                self.label(),
                state.in_use()
            );
        }
        drop(state);
        self.shared.available.notify_all();
        self.shared.returned.notify_all();
    }

    /// Close the pool gracefully: wait until every registered resource is
    /// idle, then flip the lifecycle flag.
    ///
    /// While the drain is in progress new checkouts fail fast with
    /// [`AcquireError::NotOpen`], so the wait cannot be outrun by fresh
    /// acquisitions.
    pub fn close(&self) -> Result<(), CloseError> {
        self.close_inner(None)
    }

    /// Like [`close`](Self::close), but the wait watches `cancel`. On
    /// cancellation the pool stays open and checkouts resume.
    pub fn close_cancellable(&self, cancel: &CancelToken) -> Result<(), CloseError> {
        self.close_inner(Some(cancel))
    }

    fn close_inner(&self, cancel: Option<&CancelToken>) -> Result<(), CloseError> {
        let _watch = cancel.map(|cancel| cancel.watch(self.waker()));
        let mut state = self.shared.state.lock();

        if state.lifecycle == Lifecycle::Closed {
            return Ok(());
        }

        state.closers += 1;
        debug!(
            "{}: draining {} checked-out resources",
            self.label(),
            state.in_use()
        );

        loop {
            if state.lifecycle == Lifecycle::Closed {
                // A force close finished the job while we waited.
                state.closers -= 1;
                return Ok(());
            }

            if let Some(cancel) = cancel {
                if cancel.is_cancelled() {
                    state.closers -= 1;
                    self.shared.stats.cancellations.fetch_add(1, Ordering::Relaxed);
                    debug!("{}: graceful close cancelled", self.label());
                    return Err(CloseError::Cancelled);
                }
            }

            if state.in_use() == 0 {
                state.lifecycle = Lifecycle::Closed;
                state.closers -= 1;
                info!("{}: closed", self.label());
                drop(state);
                self.shared.available.notify_all();
                self.shared.returned.notify_all();
                return Ok(());
            }

            self.shared.returned.wait(&mut state);
        }
    }

    /// Acquire a resource, blocking until one is idle.
    ///
    /// Fails fast with [`AcquireError::NotOpen`] if the pool is not open;
    /// the call never waits for the pool to be opened.
    pub fn acquire(&self) -> Result<R, AcquireError> {
        self.acquire_inner(None, None)
    }

    /// Acquire a resource, waiting at most `timeout`.
    ///
    /// Deadline expiry is an ordinary outcome ([`AcquireError::Timeout`]),
    /// not a pool malfunction.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<R, AcquireError> {
        self.acquire_inner(Instant::now().checked_add(timeout), None)
    }

    /// Acquire a resource, blocking until one is idle or `cancel` fires.
    pub fn acquire_cancellable(&self, cancel: &CancelToken) -> Result<R, AcquireError> {
        self.acquire_inner(None, Some(cancel))
    }

    /// Take an idle resource if one is ready right now.
    pub fn try_acquire(&self) -> Result<R, AcquireError> {
        let mut state = self.shared.state.lock();

        if !state.accepting() {
            return Err(AcquireError::NotOpen);
        }

        match state.idle.pop_front() {
            Some(resource) => {
                self.checkout(&mut state, &resource);
                Ok(resource)
            }
            None => Err(AcquireError::Exhausted),
        }
    }

    fn acquire_inner(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<R, AcquireError> {
        let _watch = cancel.map(|cancel| cancel.watch(self.waker()));
        let mut state = self.shared.state.lock();

        loop {
            if !state.accepting() {
                return Err(AcquireError::NotOpen);
            }

            if let Some(cancel) = cancel {
                if cancel.is_cancelled() {
                    self.shared.stats.cancellations.fetch_add(1, Ordering::Relaxed);
                    return Err(AcquireError::Cancelled);
                }
            }

            if let Some(resource) = state.idle.pop_front() {
                self.checkout(&mut state, &resource);
                return Ok(resource);
            }

            let timed_out = match deadline {
                None => {
                    self.shared.available.wait(&mut state);
                    false
                }
                Some(deadline) => self
                    .shared
                    .available
                    .wait_until(&mut state, deadline)
                    .timed_out(),
            };

            if timed_out {
                // One last look under the lock; a release may have slipped
                // in exactly at the deadline.
                if !state.accepting() {
                    return Err(AcquireError::NotOpen);
                }
                if let Some(resource) = state.idle.pop_front() {
                    self.checkout(&mut state, &resource);
                    return Ok(resource);
                }
                self.shared.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(AcquireError::Timeout);
            }
        }
    }

    /// Mark a just-dequeued resource as checked out.
    fn checkout(&self, state: &mut PoolState<R>, resource: &R) {
        let key = resource.key();
        let tag = state
            .registry
            .get_mut(&key)
            .expect("idle queue out of step with registry");
        *tag = EntryState::CheckedOut;
        self.shared.stats.acquires.fetch_add(1, Ordering::Relaxed);
        trace!("{}: checked out {:?}", self.label(), key);
    }

    /// Return a checked-out resource to the tail of the idle queue.
    ///
    /// Unknown resources (never added, or force-removed in the meantime)
    /// and double releases are reported, never enqueued; the value comes
    /// back inside the error.
    pub fn release(&self, resource: R) -> Result<(), ReleaseError<R>> {
        let key = resource.key();
        let mut state = self.shared.state.lock();
        let PoolState { registry, idle, .. } = &mut *state;

        match registry.get_mut(&key) {
            None => {
                warn!("{}: release of unknown resource {:?}", self.label(), key);
                return Err(ReleaseError::Unknown(resource));
            }
            Some(tag) if *tag == EntryState::Idle => {
                warn!("{}: double release of {:?}", self.label(), key);
                return Err(ReleaseError::AlreadyIdle(resource));
            }
            Some(tag) => {
                *tag = EntryState::Idle;
                idle.push_back(resource);
            }
        }

        self.shared.stats.releases.fetch_add(1, Ordering::Relaxed);
        trace!("{}: returned {:?}", self.label(), key);
        drop(state);
        self.shared.available.notify_one();
        self.shared.returned.notify_all();
        Ok(())
    }

    /// Register a new resource and place it at the tail of the idle queue.
    ///
    /// Works whether the pool is open or closed; a thread blocked in an
    /// acquire call may be woken by the new arrival.
    pub fn add(&self, resource: R) -> Result<(), AddError<R>> {
        let key = resource.key();
        let mut state = self.shared.state.lock();

        if state.registry.contains_key(&key) {
            return Err(AddError::AlreadyRegistered(resource));
        }

        state.registry.insert(key.clone(), EntryState::Idle);
        state.idle.push_back(resource);
        self.shared.stats.adds.fetch_add(1, Ordering::Relaxed);
        debug!(
            "{}: added {:?} ({} registered)",
            self.label(),
            key,
            state.registry.len()
        );
        drop(state);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Remove a resource gracefully, waiting until it is idle.
    ///
    /// Unknown keys fail immediately. On success the resource leaves the
    /// registry and queue in one step and its value is handed back.
    pub fn remove(&self, key: &R::Key) -> Result<R, RemoveError> {
        self.remove_inner(key, None)
    }

    /// Like [`remove`](Self::remove), but the wait watches `cancel`.
    pub fn remove_cancellable(
        &self,
        key: &R::Key,
        cancel: &CancelToken,
    ) -> Result<R, RemoveError> {
        self.remove_inner(key, Some(cancel))
    }

    fn remove_inner(&self, key: &R::Key, cancel: Option<&CancelToken>) -> Result<R, RemoveError> {
        let _watch = cancel.map(|cancel| cancel.watch(self.waker()));
        let mut state = self.shared.state.lock();

        loop {
            match state.registry.get(key).copied() {
                None => return Err(RemoveError::NotFound),
                Some(EntryState::Idle) => {
                    state.registry.remove(key);
                    let resource = state.take_idle(key);
                    self.shared.stats.removals.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "{}: removed {:?} ({} registered)",
                        self.label(),
                        key,
                        state.registry.len()
                    );
                    drop(state);
                    self.shared.returned.notify_all();
                    return Ok(resource);
                }
                Some(EntryState::CheckedOut) => {
                    if let Some(cancel) = cancel {
                        if cancel.is_cancelled() {
                            self.shared.stats.cancellations.fetch_add(1, Ordering::Relaxed);
                            return Err(RemoveError::Cancelled);
                        }
                    }
                    self.shared.returned.wait(&mut state);
                }
            }
        }
    }

    /// Remove a resource immediately, whatever its state.
    ///
    /// A checked-out resource is stolen out from under its holder: the pool
    /// forgets it at once and the holder's eventual release reports
    /// [`ReleaseError::Unknown`]. Unknown keys are a quiet no-op.
    pub fn remove_now(&self, key: &R::Key) -> ForcedRemoval<R> {
        let mut state = self.shared.state.lock();

        let removal = match state.registry.remove(key) {
            None => return ForcedRemoval::Unknown,
            Some(EntryState::Idle) => ForcedRemoval::Idle(state.take_idle(key)),
            Some(EntryState::CheckedOut) => {
                warn!(
                    "{}: {:?} force-removed while checked out",
                    self.label(),
                    key
                );
                ForcedRemoval::InUse
            }
        };

        self.shared.stats.removals.fetch_add(1, Ordering::Relaxed);
        debug!(
            "{}: force-removed {:?} ({} registered)",
            self.label(),
            key,
            state.registry.len()
        );
        drop(state);
        self.shared.returned.notify_all();
        removal
    }

    /// Occupancy snapshot under a single lock acquisition.
    pub fn counts(&self) -> PoolCounts {
        let state = self.shared.state.lock();
        PoolCounts {
            registered: state.registry.len(),
            idle: state.idle.len(),
            in_use: state.in_use(),
        }
    }

    /// Number of idle resources awaiting checkout.
    pub fn available_count(&self) -> usize {
        self.counts().idle
    }

    /// Number of resources currently checked out.
    pub fn in_use_count(&self) -> usize {
        self.counts().in_use
    }

    /// Number of registered resources, idle or checked out.
    pub fn registered_count(&self) -> usize {
        self.counts().registered
    }

    /// The name given at construction, if any.
    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquires: self.shared.stats.acquires.load(Ordering::Relaxed),
            releases: self.shared.stats.releases.load(Ordering::Relaxed),
            adds: self.shared.stats.adds.load(Ordering::Relaxed),
            removals: self.shared.stats.removals.load(Ordering::Relaxed),
            timeouts: self.shared.stats.timeouts.load(Ordering::Relaxed),
            cancellations: self.shared.stats.cancellations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::resource::Token;

    #[test]
    fn acquire_before_open_fails_fast() {
        let pool = ResourcePool::with_resources([Token::new()]);

        let start = Instant::now();
        assert_eq!(pool.acquire().unwrap_err(), AcquireError::NotOpen);
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn fifo_handout_follows_release_order() {
        let pool = ResourcePool::new();
        let first = Token::new();
        let second = Token::new();
        let (first_id, second_id) = (first.id(), second.id());

        pool.add(first).unwrap();
        pool.add(second).unwrap();
        pool.open();

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.id(), first_id);
        assert_eq!(b.id(), second_id);

        // Return them in the opposite order; handout follows return order.
        pool.release(b).unwrap();
        pool.release(a).unwrap();
        assert_eq!(pool.acquire().unwrap().id(), second_id);
        assert_eq!(pool.acquire().unwrap().id(), first_id);
    }

    #[test]
    fn acquire_timeout_expires_empty_handed() {
        let pool = ResourcePool::with_resources([Token::new()]);
        pool.open();
        let held = pool.acquire().unwrap();

        let start = Instant::now();
        assert_eq!(
            pool.acquire_timeout(Duration::from_millis(100)).unwrap_err(),
            AcquireError::Timeout
        );
        assert!(start.elapsed() >= Duration::from_millis(100));

        pool.release(held).unwrap();
    }

    #[test]
    fn try_acquire_probes_without_blocking() {
        let pool = ResourcePool::with_resources([Token::new()]);
        assert_eq!(pool.try_acquire().unwrap_err(), AcquireError::NotOpen);

        pool.open();
        let held = pool.try_acquire().unwrap();
        assert_eq!(pool.try_acquire().unwrap_err(), AcquireError::Exhausted);

        pool.release(held).unwrap();
    }

    #[test]
    fn double_release_is_rejected() {
        let pool = ResourcePool::with_resources([Token::new()]);
        pool.open();
        let held = pool.acquire().unwrap();
        let duplicate = held.clone();

        pool.release(held).unwrap();
        match pool.release(duplicate) {
            Err(ReleaseError::AlreadyIdle(_)) => {}
            other => panic!("expected AlreadyIdle, got {other:?}"),
        }

        // No duplicate ended up in the queue.
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let pool = ResourcePool::new();
        let token = Token::new();
        let copy = token.clone();

        pool.add(token).unwrap();
        match pool.add(copy) {
            Err(AddError::AlreadyRegistered(_)) => {}
            Ok(()) => panic!("duplicate registration accepted"),
        }

        assert_eq!(pool.registered_count(), 1);
    }

    #[test]
    fn duplicate_seed_keys_are_skipped() {
        let token = Token::new();
        let copy = token.clone();
        let pool = ResourcePool::with_resources([token, copy]);

        assert_eq!(
            pool.counts(),
            PoolCounts {
                registered: 1,
                idle: 1,
                in_use: 0,
            }
        );
    }

    #[test]
    fn forced_removal_of_idle_resource_returns_it() {
        let token = Token::new();
        let key = token.id();
        let pool = ResourcePool::with_resources([token]);

        match pool.remove_now(&key) {
            ForcedRemoval::Idle(token) => assert_eq!(token.id(), key),
            other => panic!("expected Idle, got {other:?}"),
        }

        // A second forced removal is a quiet no-op.
        assert!(!pool.remove_now(&key).was_known());
        assert_eq!(
            pool.counts(),
            PoolCounts {
                registered: 0,
                idle: 0,
                in_use: 0,
            }
        );
    }

    #[test]
    fn forced_removal_steals_from_holder() {
        let pool = ResourcePool::with_resources([Token::new()]);
        pool.open();
        let held = pool.acquire().unwrap();
        let key = held.id();

        let removal = pool.remove_now(&key);
        assert!(removal.was_known());
        assert!(matches!(removal, ForcedRemoval::InUse));
        assert_eq!(pool.registered_count(), 0);

        // The erstwhile holder finds its release rejected.
        match pool.release(held) {
            Err(ReleaseError::Unknown(token)) => assert_eq!(token.id(), key),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn removal_of_unknown_key_fails_immediately() {
        let pool: ResourcePool<Token> = ResourcePool::new();

        let start = Instant::now();
        assert_eq!(pool.remove(&42).unwrap_err(), RemoveError::NotFound);
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn release_still_works_after_forced_close() {
        let pool = ResourcePool::with_resources([Token::new()]);
        pool.open();
        let held = pool.acquire().unwrap();

        pool.close_now();
        assert!(!pool.is_open());
        assert_eq!(pool.in_use_count(), 1);

        pool.release(held).unwrap();
        assert_eq!(
            pool.counts(),
            PoolCounts {
                registered: 1,
                idle: 1,
                in_use: 0,
            }
        );
    }

    #[test]
    fn pool_reopens_after_close() {
        let pool = ResourcePool::with_resources([Token::new()]);
        pool.open();
        pool.close().unwrap();
        assert!(!pool.is_open());

        pool.open();
        assert!(pool.is_open());
        let held = pool.acquire().unwrap();
        pool.release(held).unwrap();
    }

    #[test]
    fn close_of_a_closed_pool_returns_at_once() {
        let pool: ResourcePool<Token> = ResourcePool::new();
        pool.close().unwrap();
        pool.close_now();
        assert!(!pool.is_open());
    }

    #[test]
    fn stats_track_operations() {
        let pool = ResourcePool::with_name("stats-pool");
        pool.add(Token::new()).unwrap();
        pool.open();

        let held = pool.acquire().unwrap();
        assert_eq!(
            pool.acquire_timeout(Duration::from_millis(10)).unwrap_err(),
            AcquireError::Timeout
        );
        pool.release(held).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.acquires, 1);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.adds, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(pool.name(), Some("stats-pool"));
    }
}
