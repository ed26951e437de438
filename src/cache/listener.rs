//! Cache listeners: observers notified when entries are added, removed or
//! expired.
//!
//! # Example
//! ```
//! use tickcache::cache::{CacheBuilder, CacheEvent, Entry, FnListener};
//! use tickcache::tasks::Scheduler;
//! use std::sync::{Arc, Mutex};
//!
//! let scheduler = Scheduler::manual();
//! let cache = CacheBuilder::<u32>::new().scheduler(&scheduler).build().unwrap();
//!
//! let log: Arc<Mutex<Vec<(CacheEvent, String)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//! cache.register(FnListener::new(move |event: CacheEvent, entry: &Entry<u32>| {
//!     log2.lock().unwrap().push((event, entry.key().to_string()));
//! }));
//!
//! cache.add("a", 1);
//! cache.remove("a");
//! assert_eq!(log.lock().unwrap().len(), 2);
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::cache::Entry;
use crate::error::CacheError;

// == CacheListener trait ==

/// Observer of entry lifecycle events on one cache.
///
/// All methods default to doing nothing.
///
/// `on_add` and explicit `on_remove` run on the caller's thread, `on_expire`
/// and sweep-driven `on_remove` on the scheduler thread. Callbacks run while
/// the cache holds its mutation lock but before the change is applied, so a
/// listener may read the same cache (`get`, `contains_key`, `len`, ...) and
/// sees the entry as it was. **Do not mutate the same cache from a
/// listener**; `add`, `remove` and `clear` would deadlock. A panicking
/// listener is caught, logged and counted, and never aborts the operation
/// that triggered it.
pub trait CacheListener<T>: Send + Sync + 'static {
    /// Called before a new entry becomes visible to readers.
    fn on_add(&self, _entry: &Entry<T>) {}

    /// Called before an entry is excised from the cache.
    fn on_remove(&self, _entry: &Entry<T>) {}

    /// Called at the moment an entry's expiry flag is set.
    fn on_expire(&self, _entry: &Entry<T>) {}
}

// == Closure listeners ==

/// A lifecycle event, as delivered to a [`FnListener`].
///
/// Displays as the name of the matching [`CacheListener`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Add,
    Remove,
    Expire,
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callback = match self {
            CacheEvent::Add => "on_add",
            CacheEvent::Remove => "on_remove",
            CacheEvent::Expire => "on_expire",
        };
        f.write_str(callback)
    }
}

/// A [`CacheListener`] backed by a single closure receiving every event.
pub struct FnListener<F>(F);

impl<F> FnListener<F> {
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(CacheEvent, &Entry<T>) + Send + Sync + 'static,
    {
        FnListener(f)
    }
}

impl<T, F> CacheListener<T> for FnListener<F>
where
    F: Fn(CacheEvent, &Entry<T>) + Send + Sync + 'static,
{
    fn on_add(&self, entry: &Entry<T>) {
        (self.0)(CacheEvent::Add, entry)
    }

    fn on_remove(&self, entry: &Entry<T>) {
        (self.0)(CacheEvent::Remove, entry)
    }

    fn on_expire(&self, entry: &Entry<T>) {
        (self.0)(CacheEvent::Expire, entry)
    }
}

// == Registry ==

/// Handle returned by [`Cache::register`](crate::cache::Cache::register),
/// used to unregister the listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type SharedListener<T> = Arc<dyn CacheListener<T>>;

/// The listeners registered on one cache, guarded by their own lock.
pub(crate) struct ListenerRegistry<T> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, SharedListener<T>)>>,
}

impl<T: 'static> ListenerRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, listener: SharedListener<T>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Copies the current listeners so callbacks run without this lock held.
    pub(crate) fn snapshot(&self) -> Dispatcher<T> {
        let listeners = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        Dispatcher { listeners }
    }
}

// == Dispatch ==

/// A point-in-time set of listeners that events are delivered to.
pub(crate) struct Dispatcher<T> {
    listeners: Vec<SharedListener<T>>,
}

impl<T: 'static> Dispatcher<T> {
    /// Delivers `event` to every listener, isolating panics.
    ///
    /// Returns the number of listeners that failed.
    pub(crate) fn notify(&self, cache: &str, event: CacheEvent, entry: &Entry<T>) -> u64 {
        let mut failures = 0;
        for listener in &self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| match event {
                CacheEvent::Add => listener.on_add(entry),
                CacheEvent::Remove => listener.on_remove(entry),
                CacheEvent::Expire => listener.on_expire(entry),
            }));

            if let Err(payload) = outcome {
                failures += 1;
                let err = CacheError::ListenerFailure {
                    event,
                    key: entry.key().to_string(),
                    message: panic_message(payload.as_ref()),
                };
                error!(cache = cache, "{}", err);
            }
        }
        failures
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
