//! Insertion Order Module
//!
//! Tracks the order in which keys were added, oldest first.

use std::collections::{BTreeMap, HashMap};

// == Insertion Order ==
/// Keys in insertion order.
///
/// Every push stamps the key with a fresh sequence number; iterating the
/// sequence map yields keys oldest first. Re-adding a key moves it to the
/// back, so a replaced entry is treated as brand new for capacity eviction.
#[derive(Debug, Default)]
pub struct InsertionOrder {
    next_seq: u64,
    by_seq: BTreeMap<u64, String>,
    seq_of: HashMap<String, u64>,
}

impl InsertionOrder {
    pub fn new() -> Self {
        Self::default()
    }

    // == Push ==
    /// Records `key` as the newest key.
    pub fn push(&mut self, key: &str) {
        self.remove(key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_seq.insert(seq, key.to_string());
        self.seq_of.insert(key.to_string(), seq);
    }

    // == Remove ==
    /// Forgets a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        if let Some(seq) = self.seq_of.remove(key) {
            self.by_seq.remove(&seq);
        }
    }

    /// Iterates keys from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &String> + '_ {
        self.by_seq.values()
    }

    pub fn clear(&mut self) {
        self.by_seq.clear();
        self.seq_of.clear();
    }
}
