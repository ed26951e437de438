//! Integration Tests for the Process-Wide Scheduler
//!
//! Lives in its own test binary so no other test shares the global
//! scheduler's state.

use std::thread::sleep;
use std::time::Duration;

use tickcache::cache::CacheBuilder;
use tickcache::tasks::{Scheduler, DEFAULT_TICK_RATE};
use tickcache::{stop_all, Cache};

fn expiring_cache(name: &str) -> Cache<u32> {
    CacheBuilder::<u32>::new()
        .name(name)
        .expire_after(Duration::from_millis(100))
        .delete_on_expire(true)
        .build()
        .unwrap()
}

// All steps share the one global scheduler, so they run in a single test.
#[test]
fn test_global_scheduler_lifecycle() {
    // == Lazy start on first build ==
    let cache = expiring_cache("global-first");
    let global = Scheduler::global();

    assert!(global.is_running());
    assert_eq!(global.tick_rate(), DEFAULT_TICK_RATE);
    assert!(global.registered() >= 1);

    cache.add("x", 1);
    sleep(Duration::from_millis(600));
    assert!(!cache.contains_key("x"), "global loop did not sweep");

    // == stop_all halts sweeping ==
    stop_all();
    assert!(!global.is_running());
    stop_all();

    cache.add("y", 2);
    sleep(Duration::from_millis(400));
    assert!(cache.contains_key("y"), "swept after stop_all");

    // == Next build restarts the loop ==
    let _second = expiring_cache("global-second");
    assert!(global.is_running());

    sleep(Duration::from_millis(600));
    assert!(!cache.contains_key("y"), "restarted loop did not sweep");

    stop_all();
    assert!(!global.is_running());
}
