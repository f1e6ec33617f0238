use alloc::format;
use alloc::string::String;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by storages and the collections built on them.
///
/// Every variant is fatal for the operation that raised it: nothing is retried
/// internally and no partial mutation is committed by a rejecting storage.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum Error {
    /// Two keys could not be ordered (for example a NaN under [`PartialOrder`]).
    ///
    /// [`PartialOrder`]: crate::red_black_tree::PartialOrder
    #[error("keys are incomparable under the active ordering")]
    Incomparable,

    /// A validating storage refused the proposed state of indices `lo..=hi`.
    #[error("mutation of indices {lo}..={hi} rejected: {reason}")]
    Rejected { lo: usize, hi: usize, reason: String },

    /// An index fell outside a bounded storage (or its arithmetic overflowed).
    #[error("index {index} is out of bounds (bound {bound})")]
    OutOfBounds { index: usize, bound: usize },

    /// Two 2-D storages with incompatible dimensions were combined.
    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch { expected: (usize, usize), actual: (usize, usize) },

    /// A structural invariant does not hold, or undoing a rejected mutation was itself
    /// rejected and left the collection half-changed.
    #[error("internal consistency violated: {0}")]
    Inconsistent(String),

    /// The requested operation is not supported.
    #[error("`{0}` is not supported")]
    Unsupported(&'static str),

    /// The storage cannot estimate its memory footprint.
    #[error("memory diagnostics are not supported by this storage")]
    DiagnosticsUnsupported,
}

impl Error {
    /// Reports that undoing a rejected mutation failed too, leaving the collection in
    /// neither the old nor the new state.
    pub(crate) fn rollback_failed(self, undo: Self) -> Self {
        Self::Inconsistent(format!("rolling back after `{self}` failed: {undo}"))
    }
}
