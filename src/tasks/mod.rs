//! Background Tasks Module
//!
//! Contains the scheduler that periodically sweeps every registered cache.
//!
//! # Tasks
//! - Sweep: applies each cache's expiration and capacity policies at a fixed rate

mod scheduler;

pub(crate) use scheduler::Sweepable;
pub use scheduler::{stop_all, Scheduler, SweepReport, DEFAULT_TICK_RATE, MAX_TICK_RATE};
