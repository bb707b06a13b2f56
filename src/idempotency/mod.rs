//! Idempotency module
//!
//! Maps client-supplied keys to the transaction they first produced, so that
//! retried requests never cause a second financial effect.

mod registry;

pub use registry::{IdempotencyKey, IdempotencyRegistry, RecordOutcome, MAX_KEY_LEN};
