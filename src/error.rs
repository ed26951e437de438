//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.
//!
//! A missing key is not an error: lookups return `Option::None`.

use thiserror::Error;

use crate::cache::CacheEvent;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A policy setting that cannot be honored (zero expiry, zero capacity, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A registered listener panicked while handling an event.
    ///
    /// Never returned from cache operations; built at the dispatch site so it
    /// can be logged and counted.
    #[error("Listener failed during {event} for key '{key}': {message}")]
    ListenerFailure {
        event: CacheEvent,
        key: String,
        message: String,
    },

    /// The scheduler loop could not be started
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A consumer failed to produce the value for a key
    #[error("Failed to load '{name}': {message}")]
    Load { name: String, message: String },
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
