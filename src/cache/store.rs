//! Cache Store Module
//!
//! The cache itself: a key → entry map plus insertion order, a listener
//! registry and the sweep that applies the eviction policies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::cache::listener::{Dispatcher, ListenerRegistry};
use crate::cache::order::InsertionOrder;
use crate::cache::stats::StatsCounter;
use crate::cache::{
    CacheBuilder, CacheEvent, CacheListener, CachePolicy, CacheStats, Entry, ListenerId,
};
use crate::clock::Clock;
use crate::tasks::{SweepReport, Sweepable};

// == Entry Storage ==
/// Entries by key, plus the order they were added in.
struct Store<T> {
    entries: HashMap<String, Arc<Entry<T>>>,
    order: InsertionOrder,
}

impl<T> Store<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: InsertionOrder::new(),
        }
    }

    fn insert(&mut self, entry: Arc<Entry<T>>) {
        self.order.push(entry.key());
        self.entries.insert(entry.key().to_string(), entry);
    }

    fn remove(&mut self, key: &str) -> Option<Arc<Entry<T>>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.remove(key);
        }
        removed
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Entries oldest first.
    fn ordered(&self) -> impl Iterator<Item = &Arc<Entry<T>>> + '_ {
        self.order.iter().filter_map(move |key| self.entries.get(key))
    }

    fn live_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_expired()).count()
    }
}

// == Cache ==
/// A thread-safe, expiring key-value cache.
///
/// One entry is kept per key; adding an existing key replaces its entry.
/// Reads take a shared lock. `add`, the `remove` family and the scheduler's
/// sweep serialize on an upgradable lock: listeners are notified while other
/// readers may still look at the cache, and the lock is upgraded to exclusive
/// only for the structural change. `clear` takes the exclusive lock outright.
///
/// Expired entries stay readable until removed, either explicitly or by the
/// delete-on-expire policy.
///
/// Cloning yields another handle to the same cache. The scheduler holds only
/// a weak reference: once every handle is dropped the cache stops being
/// swept.
pub struct Cache<T> {
    inner: Arc<CacheInner<T>>,
}

pub(crate) struct CacheInner<T> {
    name: String,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    store: RwLock<Store<T>>,
    listeners: ListenerRegistry<T>,
    stats: StatsCounter,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Cache<T>
where
    T: Send + Sync + 'static,
{
    // == Constructor ==
    pub(crate) fn new(name: String, policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                name,
                policy,
                clock,
                store: RwLock::new(Store::new()),
                listeners: ListenerRegistry::new(),
                stats: StatsCounter::new(),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder() -> CacheBuilder<T> {
        CacheBuilder::new()
    }

    pub(crate) fn as_sweepable(&self) -> std::sync::Weak<dyn Sweepable> {
        let inner: Arc<dyn Sweepable> = self.inner.clone();
        Arc::downgrade(&inner)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    // == Add ==
    /// Stores `value` under `key` as the newest entry.
    ///
    /// An existing entry for `key` is removed first (firing `on_remove`).
    /// `on_add` fires before the new entry becomes visible.
    pub fn add(&self, key: impl Into<String>, value: T) {
        let entry = self.new_entry(key.into(), value);
        let dispatcher = self.inner.listeners.snapshot();
        let store = self.inner.store.upgradable_read();
        self.insert_guarded(store, &dispatcher, entry);
    }

    // == Get ==
    /// Returns the value stored under `key`, marking it as accessed.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let store = self.inner.store.read_recursive();
        match store.entries.get(key) {
            Some(entry) => {
                self.inner.stats.record_hit();
                Some(entry.read())
            }
            None => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    /// Returns the entry stored under `key` without marking it as accessed.
    pub fn entry(&self, key: &str) -> Option<Arc<Entry<T>>> {
        self.inner.store.read_recursive().entries.get(key).cloned()
    }

    // == Reverse Lookup ==
    /// Returns the key of the oldest entry whose value equals `value`.
    pub fn get_key(&self, value: &T) -> Option<String>
    where
        T: PartialEq,
    {
        let store = self.inner.store.read_recursive();
        let key = store
            .ordered()
            .find(|entry| entry.peek().as_ref() == value)
            .map(|entry| entry.key().to_string());
        key
    }

    // == Contains ==
    /// Returns true if an entry is stored under `key`. Not counted as an access.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.store.read_recursive().entries.contains_key(key)
    }

    pub fn contains_value(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.get_key(value).is_some()
    }

    /// Returns true if an entry with the same key as `entry` is stored.
    pub fn contains_entry(&self, entry: &Entry<T>) -> bool {
        self.contains_key(entry.key())
    }

    // == Remove ==
    /// Removes the entry stored under `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        let dispatcher = self.inner.listeners.snapshot();
        let store = self.inner.store.upgradable_read();
        let entry = store.entries.get(key).cloned()?;
        let value = Arc::clone(entry.peek());
        self.remove_guarded(store, &dispatcher, vec![entry]);
        Some(value)
    }

    /// Removes every entry whose value equals `value`, returning how many
    /// were removed.
    pub fn remove_value(&self, value: &T) -> usize
    where
        T: PartialEq,
    {
        let dispatcher = self.inner.listeners.snapshot();
        let store = self.inner.store.upgradable_read();
        let matches: Vec<Arc<Entry<T>>> = store
            .ordered()
            .filter(|entry| entry.peek().as_ref() == value)
            .cloned()
            .collect();

        let removed = matches.len();
        self.remove_guarded(store, &dispatcher, matches);
        removed
    }

    /// Removes exactly this entry, if it is still the one stored under its key.
    pub fn remove_entry(&self, entry: &Entry<T>) -> bool {
        let dispatcher = self.inner.listeners.snapshot();
        let store = self.inner.store.upgradable_read();
        let stored = match store.entries.get(entry.key()) {
            Some(stored) if std::ptr::eq(Arc::as_ptr(stored), entry) => Arc::clone(stored),
            _ => return false,
        };
        self.remove_guarded(store, &dispatcher, vec![stored]);
        true
    }

    // == Clear ==
    /// Drops every entry. No listener is notified.
    pub fn clear(&self) {
        let mut store = self.inner.store.write();
        let dropped = store.entries.len();
        store.clear();
        if dropped > 0 {
            debug!(cache = %self.inner.name, dropped, "Cache cleared");
        }
    }

    // == Enumerate ==
    /// Returns the entries, oldest first, as of the moment of the call.
    ///
    /// Later adds and removes are not reflected in the returned list. The
    /// entries themselves are shared, so their expiry flag and access time
    /// stay current.
    pub fn entries(&self) -> Vec<Arc<Entry<T>>> {
        self.inner.store.read_recursive().ordered().cloned().collect()
    }

    /// Visits every entry, oldest first, under the shared lock.
    ///
    /// `f` must not call back into this cache's mutating operations.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Entry<T>),
    {
        let store = self.inner.store.read_recursive();
        for entry in store.ordered() {
            f(entry);
        }
    }

    // == Compute ==
    /// Returns the value under `key`, computing and adding it first if absent.
    ///
    /// `compute` runs without any lock held. If another thread adds the key
    /// in the meantime, its value wins and the computed one is dropped.
    pub fn get_or_insert_with<F>(&self, key: &str, compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        match self.try_get_or_insert_with(key, || Ok::<T, std::convert::Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`get_or_insert_with`](Self::get_or_insert_with).
    /// Nothing is added when `compute` fails.
    pub fn try_get_or_insert_with<F, E>(&self, key: &str, compute: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let entry = self.new_entry(key.to_string(), compute()?);
        let dispatcher = self.inner.listeners.snapshot();
        let store = self.inner.store.upgradable_read();
        if let Some(existing) = store.entries.get(key) {
            return Ok(existing.read());
        }

        let value = Arc::clone(entry.peek());
        self.insert_guarded(store, &dispatcher, entry);
        Ok(value)
    }

    // == Listeners ==
    pub fn register<L>(&self, listener: L) -> ListenerId
    where
        L: CacheListener<T>,
    {
        self.inner.listeners.register(Arc::new(listener))
    }

    /// Registers a listener that is shared with other caches or code.
    pub fn register_shared(&self, listener: Arc<dyn CacheListener<T>>) -> ListenerId {
        self.inner.listeners.register(listener)
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // == Size ==
    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner.store.read_recursive().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.read_recursive().entries.is_empty()
    }

    /// Number of stored entries that are not expired.
    pub fn live_len(&self) -> usize {
        self.inner.store.read_recursive().live_count()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let (total, live) = {
            let store = self.inner.store.read_recursive();
            (store.entries.len(), store.live_count())
        };
        self.inner.stats.snapshot(total, live)
    }

    /// Runs one sweep right away, outside the scheduler.
    #[cfg(test)]
    pub(crate) fn sweep(&self) -> SweepReport {
        self.inner.sweep()
    }

    // == Helpers ==
    fn new_entry(&self, key: String, value: T) -> Arc<Entry<T>> {
        Arc::new(Entry::new(key, value, Arc::clone(&self.inner.clock)))
    }

    fn notify(&self, dispatcher: &Dispatcher<T>, event: CacheEvent, entry: &Entry<T>) {
        let failures = dispatcher.notify(&self.inner.name, event, entry);
        self.inner.stats.record_listener_failures(failures);
    }

    /// Notifies, then upgrades to the exclusive lock and inserts `entry`,
    /// replacing any entry under the same key.
    fn insert_guarded(
        &self,
        store: RwLockUpgradableReadGuard<'_, Store<T>>,
        dispatcher: &Dispatcher<T>,
        entry: Arc<Entry<T>>,
    ) {
        let previous = store.entries.get(entry.key()).cloned();
        if let Some(previous) = &previous {
            self.notify(dispatcher, CacheEvent::Remove, previous);
        }
        self.notify(dispatcher, CacheEvent::Add, &entry);

        let mut store = RwLockUpgradableReadGuard::upgrade(store);
        if let Some(previous) = previous {
            store.remove(previous.key());
            self.inner.stats.record_removals(1);
        }
        store.insert(entry);
        self.inner.stats.record_insert();
    }

    /// Notifies `on_remove` for every entry, then upgrades and removes them.
    fn remove_guarded(
        &self,
        store: RwLockUpgradableReadGuard<'_, Store<T>>,
        dispatcher: &Dispatcher<T>,
        entries: Vec<Arc<Entry<T>>>,
    ) {
        if entries.is_empty() {
            return;
        }
        for entry in &entries {
            self.notify(dispatcher, CacheEvent::Remove, entry);
        }

        let mut store = RwLockUpgradableReadGuard::upgrade(store);
        for entry in &entries {
            store.remove(entry.key());
        }
        self.inner.stats.record_removals(entries.len() as u64);
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.policy)
            .field("entries", &self.inner.store.read_recursive().entries.len())
            .finish()
    }
}

// == Sweep ==
impl<T> Sweepable for CacheInner<T>
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    /// Applies, in order: time-based expiration, delete-on-expire, then
    /// capacity eviction.
    ///
    /// The whole sweep holds the upgradable lock, so no other mutation can
    /// interleave. Expiry flags are atomic and are set under that lock;
    /// only the removal step upgrades to exclusive access.
    fn sweep(&self) -> SweepReport {
        let now_ms = self.clock.now_millis();
        let dispatcher = self.listeners.snapshot();
        let mut report = SweepReport::default();

        let mut store = self.store.upgradable_read();

        if let Some(expiration) = self.policy.expiration {
            for entry in store.ordered() {
                if entry.is_expired() || entry.elapsed(expiration.basis, now_ms) < expiration.after {
                    continue;
                }
                if entry.mark_expired() {
                    report.expired += 1;
                    report.listener_failures +=
                        dispatcher.notify(&self.name, CacheEvent::Expire, entry);
                }
            }
        }

        if self.policy.delete_on_expire {
            let doomed: Vec<Arc<Entry<T>>> = store
                .ordered()
                .filter(|entry| entry.is_expired())
                .cloned()
                .collect();
            if !doomed.is_empty() {
                for entry in &doomed {
                    report.listener_failures +=
                        dispatcher.notify(&self.name, CacheEvent::Remove, entry);
                }

                let mut exclusive = RwLockUpgradableReadGuard::upgrade(store);
                for entry in &doomed {
                    exclusive.remove(entry.key());
                }
                report.removed = doomed.len() as u64;
                store = RwLockWriteGuard::downgrade_to_upgradable(exclusive);
            }
        }

        if let Some(limit) = self.policy.capacity_limit {
            let live = store.live_count();
            if live > limit {
                let victims: Vec<Arc<Entry<T>>> = store
                    .ordered()
                    .filter(|entry| !entry.is_expired())
                    .take(live - limit)
                    .cloned()
                    .collect();
                for entry in victims {
                    if entry.mark_expired() {
                        report.capacity_expired += 1;
                        report.listener_failures +=
                            dispatcher.notify(&self.name, CacheEvent::Expire, &entry);
                    }
                }
            }
        }
        drop(store);

        self.stats.record_sweep();
        self.stats.record_expirations(report.expired);
        self.stats.record_removals(report.removed);
        self.stats.record_capacity_expirations(report.capacity_expired);
        self.stats.record_listener_failures(report.listener_failures);
        report
    }
}
