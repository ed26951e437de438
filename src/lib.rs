//! tickcache - In-memory expiring key-value caches
//!
//! Caches are swept by a shared background scheduler that applies
//! time-based expiration, delete-on-expire and capacity eviction, and
//! notifies registered listeners of every lifecycle event.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod loader;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, CacheEvent, CacheListener, CachePolicy, ExpireBasis};
pub use config::Config;
pub use error::{CacheError, Result};
pub use loader::{AssetLoader, FileLoader};
pub use tasks::{stop_all, Scheduler};
