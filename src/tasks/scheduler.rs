//! Sweep Scheduler
//!
//! One background loop that periodically sweeps every cache registered with
//! it. Caches are held weakly: a cache dropped by its owners is pruned from
//! the registry on the next iteration.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::listener::panic_message;
use crate::error::{CacheError, Result};

// == Public Constants ==
/// Sweeps per second of the process-wide scheduler
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Highest accepted tick rate: one sweep per millisecond, the resolution of
/// the loop's timer
pub const MAX_TICK_RATE: u32 = 1000;

const THREAD_NAME: &str = "cache-scheduler";

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

// == Sweep Report ==
/// What one sweep of one cache did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries expired by the time-based policy
    pub expired: u64,
    /// Expired entries physically removed
    pub removed: u64,
    /// Entries expired by the capacity policy
    pub capacity_expired: u64,
    /// Listener callbacks that panicked
    pub listener_failures: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

/// Something the scheduler can sweep.
pub(crate) trait Sweepable: Send + Sync {
    fn name(&self) -> &str;
    fn sweep(&self) -> SweepReport;
}

// == Scheduler ==
/// A fixed-rate driver for cache sweeps.
///
/// Cloning yields another handle to the same scheduler.
///
/// # Example
/// ```
/// use tickcache::cache::CacheBuilder;
/// use tickcache::tasks::Scheduler;
///
/// // Never spawns a thread; sweeps happen only when asked.
/// let scheduler = Scheduler::manual();
/// let cache = CacheBuilder::<&str>::new()
///     .capacity_limit(1)
///     .scheduler(&scheduler)
///     .build()
///     .unwrap();
///
/// cache.add("a", "first");
/// cache.add("b", "second");
/// scheduler.tick_all();
///
/// assert!(cache.entry("a").unwrap().is_expired());
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    tick_rate: u32,
    auto_start: bool,
    registry: Mutex<Vec<Weak<dyn Sweepable>>>,
    worker: Mutex<Option<Worker>>,
    paused: AtomicBool,
    measured_rate: AtomicU32,
    iterations: AtomicU64,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

impl Scheduler {
    // == Constructors ==
    /// Creates a scheduler sweeping `tick_rate` times per second.
    ///
    /// The loop starts when the first cache registers. Fails unless
    /// `tick_rate` is between 1 and [`MAX_TICK_RATE`].
    pub fn new(tick_rate: u32) -> Result<Self> {
        if tick_rate == 0 {
            return Err(CacheError::InvalidConfiguration(
                "tick rate must be greater than zero".to_string(),
            ));
        }
        if tick_rate > MAX_TICK_RATE {
            return Err(CacheError::InvalidConfiguration(format!(
                "tick rate {} exceeds the maximum of {} per second",
                tick_rate, MAX_TICK_RATE
            )));
        }
        Ok(Self::with_mode(tick_rate, true))
    }

    /// Creates a scheduler that only sweeps when [`tick_all`](Self::tick_all)
    /// is called, unless [`start`](Self::start) is called explicitly.
    pub fn manual() -> Self {
        Self::with_mode(DEFAULT_TICK_RATE, false)
    }

    /// The process-wide scheduler used by caches built without an explicit
    /// one. Runs at [`DEFAULT_TICK_RATE`].
    pub fn global() -> &'static Scheduler {
        GLOBAL.get_or_init(|| Self::with_mode(DEFAULT_TICK_RATE, true))
    }

    fn with_mode(tick_rate: u32, auto_start: bool) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                tick_rate,
                auto_start,
                registry: Mutex::new(Vec::new()),
                worker: Mutex::new(None),
                paused: AtomicBool::new(false),
                measured_rate: AtomicU32::new(0),
                iterations: AtomicU64::new(0),
            }),
        }
    }

    // == Registration ==
    /// Adds a cache to the registry, starting the loop if this scheduler
    /// starts automatically.
    pub(crate) fn register(&self, cache: Weak<dyn Sweepable>) -> Result<()> {
        self.inner.registry.lock().push(cache);
        if self.inner.auto_start {
            self.start()?;
        }
        Ok(())
    }

    /// Number of registered caches that are still alive.
    pub fn registered(&self) -> usize {
        self.inner
            .registry
            .lock()
            .iter()
            .filter(|cache| cache.strong_count() > 0)
            .count()
    }

    // == Single Step ==
    /// Sweeps every live registered cache once, pruning dropped ones.
    ///
    /// Returns the number of caches swept. A cache whose sweep panics is
    /// logged and skipped; the others are still swept.
    pub fn tick_all(&self) -> usize {
        self.inner.tick_all()
    }

    // == Lifecycle ==
    /// Starts the background loop. Does nothing if it is already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.inner.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| CacheError::Scheduler(format!("failed to build runtime: {}", e)))?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);
        let period = Duration::from_secs(1) / self.inner.tick_rate;

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(run_loop(weak, period, shutdown_rx)))
            .map_err(|e| CacheError::Scheduler(format!("failed to spawn thread: {}", e)))?;

        info!(
            "Starting cache scheduler at {} sweeps per second",
            self.inner.tick_rate
        );
        *worker = Some(Worker { shutdown, thread });
        Ok(())
    }

    /// Stops the background loop and waits for it to finish.
    ///
    /// Idempotent, and safe to call from any thread including a listener
    /// running on the scheduler thread itself (it then does not wait).
    pub fn stop(&self) {
        let Some(worker) = self.inner.worker.lock().take() else {
            return;
        };

        let _ = worker.shutdown.send(true);
        if worker.thread.thread().id() != current_thread_id() && worker.thread.join().is_err() {
            warn!("Cache scheduler thread panicked while stopping");
        }
        self.inner.measured_rate.store(0, Ordering::Relaxed);
        info!("Cache scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.lock().is_some()
    }

    /// Skips sweeps until [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed)
    }

    // == Introspection ==
    /// Target sweeps per second.
    pub fn tick_rate(&self) -> u32 {
        self.inner.tick_rate
    }

    /// Iterations completed during the last full second of running.
    pub fn measured_tick_rate(&self) -> u32 {
        self.inner.measured_rate.load(Ordering::Relaxed)
    }

    /// Iterations completed since creation, manual or not.
    pub fn iterations(&self) -> u64 {
        self.inner.iterations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick_rate", &self.inner.tick_rate)
            .field("auto_start", &self.inner.auto_start)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Stops the process-wide scheduler if it was ever started.
///
/// Building another cache on the global scheduler starts it again.
pub fn stop_all() {
    if let Some(scheduler) = GLOBAL.get() {
        scheduler.stop();
    }
}

impl SchedulerInner {
    fn tick_all(&self) -> usize {
        let caches: Vec<Arc<dyn Sweepable>> = {
            let mut registry = self.registry.lock();
            registry.retain(|cache| cache.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };

        for cache in &caches {
            match catch_unwind(AssertUnwindSafe(|| cache.sweep())) {
                Ok(report) if !report.is_empty() => {
                    debug!(
                        cache = cache.name(),
                        expired = report.expired,
                        removed = report.removed,
                        capacity_expired = report.capacity_expired,
                        listener_failures = report.listener_failures,
                        "Sweep finished"
                    );
                }
                Ok(_) => {}
                Err(payload) => {
                    error!(
                        cache = cache.name(),
                        "Sweep panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        self.iterations.fetch_add(1, Ordering::Relaxed);
        caches.len()
    }
}

// == Loop ==
/// Ticks at `period` until shut down or until the scheduler is dropped.
///
/// A sweep that overruns the period delays the next tick; ticks never
/// overlap and missed ticks are not replayed.
async fn run_loop(
    scheduler: Weak<SchedulerInner>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut window_start = Instant::now();
    let mut window_ticks = 0u32;

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                if scheduler.paused.load(Ordering::Relaxed) {
                    continue;
                }

                scheduler.tick_all();

                window_ticks += 1;
                if window_start.elapsed() >= Duration::from_secs(1) {
                    scheduler.measured_rate.store(window_ticks, Ordering::Relaxed);
                    window_ticks = 0;
                    window_start = Instant::now();
                }
            }
        }
    }

    debug!("Cache scheduler loop exited");
}

fn current_thread_id() -> ThreadId {
    thread::current().id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Probe {
        sweeps: AtomicUsize,
        panics: bool,
    }

    impl Probe {
        fn new(panics: bool) -> Arc<Self> {
            Arc::new(Self {
                sweeps: AtomicUsize::new(0),
                panics,
            })
        }

        fn sweeps(&self) -> usize {
            self.sweeps.load(Ordering::SeqCst)
        }
    }

    impl Sweepable for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn sweep(&self) -> SweepReport {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("sweep exploded");
            }
            SweepReport::default()
        }
    }

    fn weak(probe: &Arc<Probe>) -> Weak<dyn Sweepable> {
        let probe: Arc<dyn Sweepable> = probe.clone();
        Arc::downgrade(&probe)
    }

    #[test]
    fn test_new_rejects_zero_tick_rate() {
        assert!(matches!(
            Scheduler::new(0),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_new_rejects_tick_rate_above_max() {
        assert!(matches!(
            Scheduler::new(MAX_TICK_RATE + 1),
            Err(CacheError::InvalidConfiguration(_))
        ));
        // Would truncate to a zero tick period
        assert!(matches!(
            Scheduler::new(2_000_000_000),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_max_tick_rate_loop_sweeps() {
        let scheduler = Scheduler::new(MAX_TICK_RATE).unwrap();
        let probe = Probe::new(false);

        scheduler.register(weak(&probe)).unwrap();
        thread::sleep(Duration::from_millis(200));
        scheduler.stop();

        assert!(probe.sweeps() >= 10, "only {} sweeps", probe.sweeps());
    }

    #[test]
    fn test_manual_scheduler_does_not_start() {
        let scheduler = Scheduler::manual();
        let probe = Probe::new(false);

        scheduler.register(weak(&probe)).unwrap();

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.tick_all(), 1);
        assert_eq!(probe.sweeps(), 1);
        assert_eq!(scheduler.iterations(), 1);
    }

    #[test]
    fn test_dropped_caches_are_pruned() {
        let scheduler = Scheduler::manual();
        let kept = Probe::new(false);
        let dropped = Probe::new(false);

        scheduler.register(weak(&kept)).unwrap();
        scheduler.register(weak(&dropped)).unwrap();
        assert_eq!(scheduler.registered(), 2);

        drop(dropped);

        assert_eq!(scheduler.tick_all(), 1);
        assert_eq!(scheduler.registered(), 1);
        assert_eq!(scheduler.inner.registry.lock().len(), 1);
    }

    #[test]
    fn test_panicking_sweep_does_not_stop_others() {
        let scheduler = Scheduler::manual();
        let bad = Probe::new(true);
        let good = Probe::new(false);

        scheduler.register(weak(&bad)).unwrap();
        scheduler.register(weak(&good)).unwrap();

        assert_eq!(scheduler.tick_all(), 2);
        assert_eq!(scheduler.tick_all(), 2);
        assert_eq!(bad.sweeps(), 2);
        assert_eq!(good.sweeps(), 2);
    }

    #[test]
    fn test_start_stop_is_idempotent() {
        let scheduler = Scheduler::new(50).unwrap();

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        // Restart after stop is allowed
        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[test]
    fn test_running_loop_sweeps_registered_caches() {
        let scheduler = Scheduler::new(50).unwrap();
        let probe = Probe::new(false);

        scheduler.register(weak(&probe)).unwrap();
        assert!(scheduler.is_running());

        thread::sleep(Duration::from_millis(300));
        scheduler.stop();

        assert!(probe.sweeps() >= 3, "only {} sweeps", probe.sweeps());
    }

    #[test]
    fn test_pause_skips_sweeps() {
        let scheduler = Scheduler::new(50).unwrap();
        let probe = Probe::new(false);
        scheduler.pause();
        scheduler.register(weak(&probe)).unwrap();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(probe.sweeps(), 0);

        scheduler.resume();
        thread::sleep(Duration::from_millis(200));
        scheduler.stop();

        assert!(probe.sweeps() > 0);
    }

    #[test]
    fn test_measured_tick_rate() {
        let scheduler = Scheduler::new(20).unwrap();
        scheduler.start().unwrap();

        thread::sleep(Duration::from_millis(1_300));
        let rate = scheduler.measured_tick_rate();
        scheduler.stop();

        assert!((15..=25).contains(&rate), "measured {} ticks per second", rate);
        assert_eq!(scheduler.measured_tick_rate(), 0);
    }

    #[test]
    fn test_dropping_scheduler_ends_loop() {
        let scheduler = Scheduler::new(50).unwrap();
        scheduler.start().unwrap();
        let inner = Arc::downgrade(&scheduler.inner);

        drop(scheduler);
        thread::sleep(Duration::from_millis(100));

        assert!(inner.upgrade().is_none());
    }
}
