//! Configuration Module
//!
//! Loads the driver's cache policy and scheduler settings from environment
//! variables.

use std::env;

use crate::cache::{CachePolicy, ExpireBasis};
use crate::tasks::DEFAULT_TICK_RATE;

/// Driver configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. Numeric policy values `<= 0` disable the matching policy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Expire entries this many milliseconds after `expire_basis`
    pub expire_after_ms: i64,
    /// Timestamp the expiry is measured from
    pub expire_basis: ExpireBasis,
    /// Remove expired entries during the sweep that expires them
    pub delete_on_expire: bool,
    /// Maximum live entries before the oldest are expired
    pub capacity_limit: i64,
    /// Scheduler sweeps per second
    pub tick_rate: u32,
    /// Seconds between statistics reports
    pub stats_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_EXPIRE_AFTER_MS` - Expiry in milliseconds (default: 420000)
    /// - `CACHE_EXPIRE_BASIS` - `creation` or `last_access` (default: last_access)
    /// - `CACHE_DELETE_ON_EXPIRE` - Remove expired entries (default: true)
    /// - `CACHE_CAPACITY_LIMIT` - Live entry limit (default: 0, disabled)
    /// - `SCHEDULER_TICK_RATE` - Sweeps per second (default: 20)
    /// - `STATS_INTERVAL` - Statistics report frequency in seconds (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            expire_after_ms: parse_var("CACHE_EXPIRE_AFTER_MS").unwrap_or(defaults.expire_after_ms),
            expire_basis: parse_var("CACHE_EXPIRE_BASIS").unwrap_or(defaults.expire_basis),
            delete_on_expire: parse_var("CACHE_DELETE_ON_EXPIRE")
                .unwrap_or(defaults.delete_on_expire),
            capacity_limit: parse_var("CACHE_CAPACITY_LIMIT").unwrap_or(defaults.capacity_limit),
            tick_rate: parse_var("SCHEDULER_TICK_RATE")
                .filter(|&rate| rate > 0)
                .unwrap_or(defaults.tick_rate),
            stats_interval: parse_var("STATS_INTERVAL")
                .filter(|&secs| secs > 0)
                .unwrap_or(defaults.stats_interval),
        }
    }

    /// The cache policy described by this configuration.
    pub fn policy(&self) -> CachePolicy {
        CachePolicy::from_parts(
            self.expire_after_ms,
            self.expire_basis,
            self.delete_on_expire,
            self.capacity_limit,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expire_after_ms: 7 * 60 * 1000,
            expire_basis: ExpireBasis::SinceLastAccess,
            delete_on_expire: true,
            capacity_limit: 0,
            tick_rate: DEFAULT_TICK_RATE,
            stats_interval: 5,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
