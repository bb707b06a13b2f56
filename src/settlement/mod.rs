//! Settlement Worker Pool
//!
//! A fixed set of workers drains one bounded FIFO queue of settlement jobs.
//! Submission never blocks: a full queue is reported to the caller. Each job
//! runs in isolation, so a failing or panicking job only fails its own
//! transaction. Stopping the pool closes submission and drains every job
//! already queued.

mod job;
mod pool;

pub use job::{SettlementDeps, SettlementEffect, SettlementError, SettlementJob};
pub use pool::SettlementPool;

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Why a job was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Settlement queue is full")]
    QueueFull,

    #[error("Settlement pool is closed")]
    Closed,
}
