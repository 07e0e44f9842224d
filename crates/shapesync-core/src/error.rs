//! Error taxonomy for the mutation engine.
//!
//! Deliberately minimal. A missing row is *not* an error: `move_shape`,
//! `update_shape` and `delete_shape` on an id that no longer exists succeed
//! as silent no-ops, so an in-flight mutation that races a delete simply
//! does nothing.

use thiserror::Error;

/// Reasons a mutation request is rejected before touching any state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// A geometry or cursor argument was NaN or infinite.
    #[error("non-finite value for {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },
    /// The store lock was poisoned by a panic in another thread.
    #[error("canvas store lock poisoned")]
    StorePoisoned,
}

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;
