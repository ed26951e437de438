//! Cache Module
//!
//! Provides an in-memory cache with time-based expiration, capacity
//! eviction and lifecycle listeners.

mod builder;
mod entry;
pub(crate) mod listener;
mod order;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use builder::CacheBuilder;
pub use entry::Entry;
pub use listener::{CacheEvent, CacheListener, FnListener, ListenerId};
pub use policy::{CachePolicy, ExpireBasis, Expiration};
pub use stats::CacheStats;
pub use store::Cache;
