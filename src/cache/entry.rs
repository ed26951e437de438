//! Cache Entry Module
//!
//! Defines a single stored value together with its lifecycle metadata.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::ExpireBasis;
use crate::clock::{millis_to_datetime, Clock};

// == Cache Entry ==
/// One stored key/value pair plus its creation time, last access time and
/// expiry flag.
///
/// The expiry flag is a one-way gate: once set it is never cleared.
/// `last_accessed_at` is an atomic so that reads only need shared access to
/// the owning cache.
pub struct Entry<T> {
    key: String,
    value: Arc<T>,
    created_at: DateTime<Utc>,
    last_accessed_ms: AtomicI64,
    expired: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl<T> Entry<T> {
    // == Constructor ==
    /// Creates a live entry stamped with the clock's current time.
    pub(crate) fn new(key: String, value: T, clock: Arc<dyn Clock>) -> Self {
        let created_at = clock.now();
        Self {
            key,
            value: Arc::new(value),
            created_at,
            last_accessed_ms: AtomicI64::new(created_at.timestamp_millis()),
            expired: AtomicBool::new(false),
            clock,
        }
    }

    /// The key this entry was stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    // == Read ==
    /// Returns the value and marks the entry as just accessed.
    ///
    /// This is the accessor used by [`Cache::get`](crate::cache::Cache::get).
    pub fn read(&self) -> Arc<T> {
        self.touch();
        Arc::clone(&self.value)
    }

    // == Peek ==
    /// Returns the value without updating the access time.
    ///
    /// Meant for diagnostics over a snapshot, where looking at an entry should
    /// not keep it alive under a last-access policy.
    pub fn peek(&self) -> &Arc<T> {
        &self.value
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.last_accessed_ms.load(Ordering::Acquire))
    }

    // == Expiry Flag ==
    /// Returns true once the entry has been expired.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Flags the entry as expired.
    ///
    /// Returns `true` only for the call that actually flipped the flag, so
    /// callers can fire `on_expire` exactly once.
    pub fn mark_expired(&self) -> bool {
        !self.expired.swap(true, Ordering::AcqRel)
    }

    /// Time elapsed at `now_ms` since the timestamp selected by `basis`.
    ///
    /// Clamped to zero if the clock went backwards.
    pub(crate) fn elapsed(&self, basis: ExpireBasis, now_ms: i64) -> Duration {
        let since = match basis {
            ExpireBasis::SinceCreation => self.created_at.timestamp_millis(),
            ExpireBasis::SinceLastAccess => self.last_accessed_ms.load(Ordering::Acquire),
        };
        let millis = now_ms.saturating_sub(since).max(0);
        Duration::from_millis(millis as u64)
    }

    fn touch(&self) {
        let now = self.clock.now_millis();
        self.last_accessed_ms.fetch_max(now, Ordering::AcqRel);
    }
}

impl<T> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .field("last_accessed_at", &self.last_accessed_at())
            .field("expired", &self.is_expired())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn entry_with_clock(value: u32) -> (Entry<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let entry = Entry::new("k".to_string(), value, clock.clone());
        (entry, clock)
    }

    #[test]
    fn test_entry_creation() {
        let (entry, _clock) = entry_with_clock(7);

        assert_eq!(entry.key(), "k");
        assert_eq!(**entry.peek(), 7);
        assert_eq!(entry.created_at(), entry.last_accessed_at());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_read_touches_access_time() {
        let (entry, clock) = entry_with_clock(1);
        let created = entry.created_at();

        clock.advance(Duration::from_millis(40));
        assert_eq!(*entry.read(), 1);

        assert_eq!(entry.created_at(), created);
        assert_eq!(
            (entry.last_accessed_at() - created).num_milliseconds(),
            40
        );
    }

    #[test]
    fn test_peek_does_not_touch() {
        let (entry, clock) = entry_with_clock(1);
        let before = entry.last_accessed_at();

        clock.advance(Duration::from_millis(40));
        let _ = entry.peek();

        assert_eq!(entry.last_accessed_at(), before);
    }

    #[test]
    fn test_mark_expired_is_one_way() {
        let (entry, _clock) = entry_with_clock(1);

        assert!(entry.mark_expired());
        assert!(entry.is_expired());

        // Second call is a no-op
        assert!(!entry.mark_expired());
        assert!(entry.is_expired());

        // Reading never resets the flag
        let _ = entry.read();
        assert!(entry.is_expired());
    }

    #[test]
    fn test_elapsed_by_basis() {
        let (entry, clock) = entry_with_clock(1);

        clock.advance(Duration::from_millis(30));
        let _ = entry.read();
        clock.advance(Duration::from_millis(30));

        let now = clock.now_millis();
        assert_eq!(
            entry.elapsed(ExpireBasis::SinceCreation, now),
            Duration::from_millis(60)
        );
        assert_eq!(
            entry.elapsed(ExpireBasis::SinceLastAccess, now),
            Duration::from_millis(30)
        );
    }

    #[test]
    fn test_elapsed_clamps_when_clock_goes_backwards() {
        let (entry, clock) = entry_with_clock(1);
        let now = clock.now_millis() - 1_000;

        assert_eq!(entry.elapsed(ExpireBasis::SinceCreation, now), Duration::ZERO);
    }

    #[test]
    fn test_debug_omits_value() {
        let (entry, _clock) = entry_with_clock(1);
        let rendered = format!("{:?}", entry);

        assert!(rendered.contains("key: \"k\""));
        assert!(rendered.contains("expired: false"));
    }
}
