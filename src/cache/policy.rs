//! Eviction Policy Module
//!
//! Configuration for the three eviction steps applied on every sweep:
//! time-based expiration, delete-on-expire and capacity eviction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Expire Basis ==
/// Which timestamp an expiry duration is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireBasis {
    /// Measure from the moment the entry was added
    #[default]
    SinceCreation,
    /// Measure from the last read through [`Entry::read`](crate::cache::Entry::read)
    SinceLastAccess,
}

impl FromStr for ExpireBasis {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creation" | "since_creation" => Ok(ExpireBasis::SinceCreation),
            "last_access" | "since_last_access" => Ok(ExpireBasis::SinceLastAccess),
            other => Err(CacheError::InvalidConfiguration(format!(
                "unknown expire basis '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ExpireBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpireBasis::SinceCreation => f.write_str("since_creation"),
            ExpireBasis::SinceLastAccess => f.write_str("since_last_access"),
        }
    }
}

// == Expiration ==
/// Time-based expiration settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    pub after: Duration,
    pub basis: ExpireBasis,
}

// == Cache Policy ==
/// The full, immutable policy of one cache.
///
/// `None` disables the corresponding step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachePolicy {
    pub expiration: Option<Expiration>,
    pub delete_on_expire: bool,
    pub capacity_limit: Option<usize>,
}

impl CachePolicy {
    /// Builds a policy from plain numbers, where any value `<= 0` disables
    /// the matching step.
    pub fn from_parts(
        expire_after_ms: i64,
        basis: ExpireBasis,
        delete_on_expire: bool,
        capacity_limit: i64,
    ) -> Self {
        let expiration = (expire_after_ms > 0).then(|| Expiration {
            after: Duration::from_millis(expire_after_ms as u64),
            basis,
        });
        let capacity_limit = usize::try_from(capacity_limit).ok().filter(|&n| n > 0);

        Self {
            expiration,
            delete_on_expire,
            capacity_limit,
        }
    }

    // == Validate ==
    /// Rejects settings that would silently disable a requested policy.
    pub fn validate(&self) -> Result<()> {
        if let Some(expiration) = &self.expiration {
            if expiration.after.is_zero() {
                return Err(CacheError::InvalidConfiguration(
                    "expiry duration must be greater than zero".to_string(),
                ));
            }
        }

        if self.capacity_limit == Some(0) {
            return Err(CacheError::InvalidConfiguration(
                "capacity limit must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn expiration_enabled(&self) -> bool {
        self.expiration.is_some()
    }

    pub fn capacity_limit_enabled(&self) -> bool {
        self.capacity_limit.is_some()
    }
}
