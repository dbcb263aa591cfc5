//! Randomized concurrency harness for the corral resource pool.
//!
//! Spins up worker threads that hammer one shared pool with a weighted mix
//! of the public operations (open, add, timed acquire, release, graceful
//! removal and close with forced fallbacks), then drains everything and
//! reports per-operation tallies.

use anyhow::Result;
use clap::Parser;
use corral_pool::{AcquireError, CancelToken, ReleaseError, ResourcePool, Token};
use crossbeam_channel::{bounded, unbounded};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long a worker waits for a resource before shrugging.
const ACQUIRE_WAIT: Duration = Duration::from_secs(1);

/// How long a graceful removal may stall before it is forced.
const REMOVE_GRACE: Duration = Duration::from_secs(5);

/// How long a mid-run graceful close may stall before it is forced.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How long the final drain may take before the pool is force closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Stress the resource pool with randomized concurrent callers.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Number of worker threads
    #[clap(long, default_value_t = 8)]
    workers: usize,

    /// Number of resources seeded into the pool
    #[clap(long, default_value_t = 5)]
    resources: usize,

    /// How long to run, in seconds
    #[clap(long, default_value_t = 30)]
    duration_secs: u64,

    /// Upper bound for each worker's per-iteration sleep, in milliseconds
    #[clap(long, default_value_t = 100)]
    max_sleep_ms: u64,

    /// Seed for the per-worker RNGs; random when omitted
    #[clap(long)]
    seed: Option<u64>,
}

/// Per-worker operation tallies, merged by the main thread at the end.
#[derive(Debug, Default, Clone)]
struct Tally {
    acquires: usize,
    releases: usize,
    timeouts: usize,
    adds: usize,
    removals: usize,
    forced_removals: usize,
    opens: usize,
    closes: usize,
    forced_closes: usize,
}

impl Tally {
    fn absorb(&mut self, other: &Tally) {
        self.acquires += other.acquires;
        self.releases += other.releases;
        self.timeouts += other.timeouts;
        self.adds += other.adds;
        self.removals += other.removals;
        self.forced_removals += other.forced_removals;
        self.opens += other.opens;
        self.closes += other.closes;
        self.forced_closes += other.forced_closes;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(
        "stress run: {} workers, {} resources, {}s, seed {}",
        args.workers, args.resources, args.duration_secs, seed
    );

    let pool = ResourcePool::with_name("stress-pool");
    for _ in 0..args.resources {
        pool.add(Token::new())?;
    }
    pool.open();

    let stop = Arc::new(AtomicBool::new(false));
    let (tally_tx, tally_rx) = unbounded();
    let max_sleep_ms = args.max_sleep_ms;

    let mut handles = Vec::with_capacity(args.workers);
    for index in 0..args.workers {
        let pool = pool.clone();
        let stop = Arc::clone(&stop);
        let tally_tx = tally_tx.clone();
        let rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));

        let handle = thread::Builder::new()
            .name(format!("stress-worker-{}", index))
            .spawn(move || {
                let tally = worker(index, pool, stop, rng, max_sleep_ms);
                let _ = tally_tx.send(tally);
            })?;
        handles.push(handle);
    }
    drop(tally_tx);

    thread::sleep(Duration::from_secs(args.duration_secs));
    info!("run time elapsed, stopping workers");
    stop.store(true, Ordering::SeqCst);

    for handle in handles {
        if handle.join().is_err() {
            warn!("a worker thread panicked");
        }
    }

    let mut total = Tally::default();
    for tally in tally_rx.iter() {
        total.absorb(&tally);
    }

    shutdown(&pool);
    report(&pool, &total);
    Ok(())
}

/// One worker's randomized life against the shared pool. Rare lifecycle
/// events sit in narrow probability bands so the common churn dominates.
fn worker(
    index: usize,
    pool: ResourcePool<Token>,
    stop: Arc<AtomicBool>,
    mut rng: StdRng,
    max_sleep_ms: u64,
) -> Tally {
    let mut tally = Tally::default();
    let mut added: Vec<u64> = Vec::new();
    let mut held: Vec<Token> = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(rng.random_range(0..=max_sleep_ms)));
        let roll: f64 = rng.random();

        if roll >= 0.995 {
            if !pool.is_open() {
                info!("worker {}: opening the pool", index);
                pool.open();
                tally.opens += 1;
            }
        } else if roll >= 0.990 {
            let token = Token::new();
            let key = token.id();
            if pool.add(token).is_ok() {
                debug!("worker {}: added resource {}", index, key);
                added.push(key);
                tally.adds += 1;
            }
        } else if (0.80..0.90).contains(&roll) {
            match pool.acquire_timeout(ACQUIRE_WAIT) {
                Ok(token) => {
                    debug!("worker {}: acquired {}", index, token);
                    held.push(token);
                    tally.acquires += 1;
                }
                Err(AcquireError::Timeout) => tally.timeouts += 1,
                Err(AcquireError::NotOpen) => {}
                Err(AcquireError::Cancelled | AcquireError::Exhausted) => {}
            }
        } else if (0.70..0.80).contains(&roll) {
            release_one(index, &pool, &mut held, &mut rng, &mut tally);
        } else if (0.001..0.002).contains(&roll) {
            remove_one(index, &pool, &mut added, &held, &mut tally);
        } else if roll < 0.001 && pool.is_open() {
            close_with_fallback(index, &pool, &mut tally);
        }
    }

    // Hand everything back before reporting in.
    for token in held.drain(..) {
        if pool.release(token).is_ok() {
            tally.releases += 1;
        }
    }

    tally
}

/// Release one randomly chosen held resource.
fn release_one(
    index: usize,
    pool: &ResourcePool<Token>,
    held: &mut Vec<Token>,
    rng: &mut StdRng,
    tally: &mut Tally,
) {
    if held.is_empty() {
        return;
    }

    let victim = rng.random_range(0..held.len());
    let token = held.swap_remove(victim);
    match pool.release(token) {
        Ok(()) => tally.releases += 1,
        Err(ReleaseError::Unknown(token)) => {
            debug!("worker {}: {} was stolen while held", index, token);
        }
        Err(ReleaseError::AlreadyIdle(token)) => {
            warn!("worker {}: unexpected double release of {}", index, token);
        }
    }
}

/// Gracefully remove one of this worker's own additions, falling back to a
/// forced removal when the wait stalls.
fn remove_one(
    index: usize,
    pool: &ResourcePool<Token>,
    added: &mut Vec<u64>,
    held: &[Token],
    tally: &mut Tally,
) {
    let Some(&key) = added
        .iter()
        .find(|key| !held.iter().any(|token| token.id() == **key))
    else {
        return;
    };

    info!("worker {}: removing resource {}", index, key);
    let (done_tx, done_rx) = bounded(1);
    let removal_pool = pool.clone();
    thread::spawn(move || {
        let _ = done_tx.send(removal_pool.remove(&key).is_ok());
    });

    match done_rx.recv_timeout(REMOVE_GRACE) {
        Ok(true) => tally.removals += 1,
        Ok(false) => debug!("worker {}: resource {} was already gone", index, key),
        Err(_) => {
            warn!("worker {}: removal of {} stalled, forcing", index, key);
            if pool.remove_now(&key).was_known() {
                tally.forced_removals += 1;
            }
        }
    }
    added.retain(|k| *k != key);
}

/// Close the pool gracefully, forcing the issue if the drain stalls; the
/// pool may be waiting on resources this very worker holds.
fn close_with_fallback(index: usize, pool: &ResourcePool<Token>, tally: &mut Tally) {
    info!("worker {}: closing the pool", index);
    let (done_tx, done_rx) = bounded(1);
    let closing_pool = pool.clone();
    thread::spawn(move || {
        let _ = done_tx.send(closing_pool.close().is_ok());
    });

    match done_rx.recv_timeout(CLOSE_GRACE) {
        Ok(_) => {
            info!("worker {}: pool closed", index);
            tally.closes += 1;
        }
        Err(_) => {
            if pool.is_open() {
                warn!("worker {}: graceful close stalled, forcing", index);
                pool.close_now();
                tally.forced_closes += 1;
            }
        }
    }
}

/// Final drain: graceful close under a deadline, then force.
fn shutdown(pool: &ResourcePool<Token>) {
    if !pool.is_open() {
        info!("pool already closed at shutdown");
        return;
    }

    let cancel = CancelToken::new();
    let timer = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(SHUTDOWN_GRACE);
            cancel.cancel();
        })
    };

    match pool.close_cancellable(&cancel) {
        Ok(()) => info!("pool drained and closed"),
        Err(_) => {
            warn!("graceful close timed out, forcing");
            pool.close_now();
        }
    }
    drop(timer); // the timer thread winds down on its own
}

/// Log the aggregated run summary and a final consistency check.
fn report(pool: &ResourcePool<Token>, total: &Tally) {
    let counts = pool.counts();
    let stats = pool.stats();

    info!(
        "workers: {} acquires ({} timeouts), {} releases, {} adds, {} removals ({} forced), \
         {} opens, {} closes ({} forced)",
        total.acquires,
        total.timeouts,
        total.releases,
        total.adds,
        total.removals,
        total.forced_removals,
        total.opens,
        total.closes,
        total.forced_closes
    );
    info!(
        "pool: {} registered, {} idle, {} in use; engine counters {:?}",
        counts.registered, counts.idle, counts.in_use, stats
    );

    if counts.idle + counts.in_use != counts.registered {
        warn!("pool books are inconsistent: {:?}", counts);
    }
}
