//! Cache Builder Module
//!
//! Fluent construction of caches: policy, clock and scheduler, validated
//! before the cache is registered for sweeping.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::{Cache, CachePolicy, ExpireBasis, Expiration};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::tasks::Scheduler;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(0);

/// Builder for configuring and constructing a [`Cache`].
///
/// Every policy starts disabled. Settings that cannot be honored, such as
/// a zero expiry duration or a zero capacity limit, make
/// [`build`](Self::build) fail instead of silently disabling the policy.
///
/// # Example
/// ```
/// use tickcache::cache::{CacheBuilder, ExpireBasis};
/// use std::time::Duration;
///
/// let cache = CacheBuilder::<String>::new()
///     .name("thumbnails")
///     .expire_after(Duration::from_secs(60))
///     .expire_basis(ExpireBasis::SinceLastAccess)
///     .delete_on_expire(true)
///     .capacity_limit(500)
///     .build()
///     .unwrap();
///
/// cache.add("a", "b".to_string());
/// ```
pub struct CacheBuilder<T> {
    name: Option<String>,
    expire_after: Option<Duration>,
    expire_basis: ExpireBasis,
    delete_on_expire: bool,
    capacity_limit: Option<usize>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Scheduler>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CacheBuilder<T> {
    pub fn new() -> Self {
        CacheBuilder {
            name: None,
            expire_after: None,
            expire_basis: ExpireBasis::default(),
            delete_on_expire: false,
            capacity_limit: None,
            clock: Arc::new(SystemClock),
            scheduler: None,
            _marker: PhantomData,
        }
    }

    /// Name used in log output (default: `cache-<n>`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables time-based expiration after `after`.
    pub fn expire_after(mut self, after: Duration) -> Self {
        self.expire_after = Some(after);
        self
    }

    /// Which timestamp the expiry duration is measured from
    /// (default: [`ExpireBasis::SinceCreation`]).
    pub fn expire_basis(mut self, basis: ExpireBasis) -> Self {
        self.expire_basis = basis;
        self
    }

    /// Physically remove expired entries during the sweep that finds them.
    pub fn delete_on_expire(mut self, delete: bool) -> Self {
        self.delete_on_expire = delete;
        self
    }

    /// Enables capacity eviction: when more than `limit` entries are live,
    /// the oldest are expired.
    pub fn capacity_limit(mut self, limit: usize) -> Self {
        self.capacity_limit = Some(limit);
        self
    }

    /// Replaces every policy setting at once.
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.expire_after = policy.expiration.map(|e| e.after);
        if let Some(expiration) = policy.expiration {
            self.expire_basis = expiration.basis;
        }
        self.delete_on_expire = policy.delete_on_expire;
        self.capacity_limit = policy.capacity_limit;
        self
    }

    /// Time source for entry timestamps and sweeps (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Scheduler that sweeps the cache (default: [`Scheduler::global`]).
    pub fn scheduler(mut self, scheduler: &Scheduler) -> Self {
        self.scheduler = Some(scheduler.clone());
        self
    }

    fn resolve_policy(&self) -> Result<CachePolicy> {
        let policy = CachePolicy {
            expiration: self.expire_after.map(|after| Expiration {
                after,
                basis: self.expire_basis,
            }),
            delete_on_expire: self.delete_on_expire,
            capacity_limit: self.capacity_limit,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl<T> CacheBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Builds the cache and registers it with its scheduler, starting the
    /// scheduler if needed.
    pub fn build(self) -> Result<Cache<T>> {
        let policy = self.resolve_policy()?;
        let name = self
            .name
            .unwrap_or_else(|| format!("cache-{}", NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)));
        if name.is_empty() {
            return Err(CacheError::InvalidConfiguration(
                "cache name must not be empty".to_string(),
            ));
        }

        let cache = Cache::new(name, policy, self.clock);
        let scheduler = self.scheduler.unwrap_or_else(|| Scheduler::global().clone());
        scheduler.register(cache.as_sweepable())?;

        info!(
            cache = cache.name(),
            expiration = ?policy.expiration,
            delete_on_expire = policy.delete_on_expire,
            capacity_limit = ?policy.capacity_limit,
            "Initialized new cache"
        );
        Ok(cache)
    }
}

impl<T> Default for CacheBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_builder_defaults() {
        let scheduler = Scheduler::manual();
        let cache = CacheBuilder::<u8>::new().scheduler(&scheduler).build().unwrap();

        assert_eq!(*cache.policy(), CachePolicy::default());
        assert!(cache.name().starts_with("cache-"));
        assert_eq!(scheduler.registered(), 1);
    }

    #[test]
    fn test_builder_full_policy() {
        let scheduler = Scheduler::manual();
        let cache = CacheBuilder::<u8>::new()
            .name("assets")
            .expire_after(Duration::from_millis(250))
            .expire_basis(ExpireBasis::SinceLastAccess)
            .delete_on_expire(true)
            .capacity_limit(10)
            .scheduler(&scheduler)
            .build()
            .unwrap();

        assert_eq!(cache.name(), "assets");
        assert_eq!(
            *cache.policy(),
            CachePolicy {
                expiration: Some(Expiration {
                    after: Duration::from_millis(250),
                    basis: ExpireBasis::SinceLastAccess,
                }),
                delete_on_expire: true,
                capacity_limit: Some(10),
            }
        );
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let scheduler = Scheduler::manual();
        let result = CacheBuilder::<u8>::new()
            .capacity_limit(0)
            .scheduler(&scheduler)
            .build();

        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
        assert_eq!(scheduler.registered(), 0);
    }

    #[test]
    fn test_builder_rejects_zero_expiry() {
        let scheduler = Scheduler::manual();
        let result = CacheBuilder::<u8>::new()
            .expire_after(Duration::ZERO)
            .scheduler(&scheduler)
            .build();

        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        let scheduler = Scheduler::manual();
        let result = CacheBuilder::<u8>::new().name("").scheduler(&scheduler).build();

        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_builder_policy_from_parts() {
        let scheduler = Scheduler::manual();
        let policy = CachePolicy::from_parts(100, ExpireBasis::SinceLastAccess, true, 0);
        let cache = CacheBuilder::<u8>::new()
            .policy(policy)
            .scheduler(&scheduler)
            .build()
            .unwrap();

        assert_eq!(*cache.policy(), policy);
    }

    #[test]
    fn test_builder_uses_clock() {
        let scheduler = Scheduler::manual();
        let clock = Arc::new(ManualClock::new());
        let cache = CacheBuilder::<u8>::new()
            .clock(clock.clone())
            .scheduler(&scheduler)
            .build()
            .unwrap();

        cache.add("a", 1);

        assert_eq!(cache.entry("a").unwrap().created_at(), clock.now());
    }

    #[test]
    fn test_dropped_cache_leaves_registry() {
        let scheduler = Scheduler::manual();
        let cache = CacheBuilder::<u8>::new().scheduler(&scheduler).build().unwrap();
        let handle = cache.clone();

        drop(cache);
        assert_eq!(scheduler.registered(), 1);

        drop(handle);
        assert_eq!(scheduler.tick_all(), 0);
        assert_eq!(scheduler.registered(), 0);
    }
}
