use thiserror::Error;

/// Result type alias for filter construction and queries.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Error returned when building or misusing a filter fails.
///
/// Lookups never fail: `find` returns a boolean, and false positives are
/// inherent to approximate membership, not errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    /// A cuckoo/vacuum insertion exhausted its kick budget. Carries the
    /// number of fingerprints stored at the time of failure so the caller
    /// can decide between rebuilding with more capacity and aborting.
    #[error("insertion failed after exhausting kicks ({occupancy} fingerprints stored)")]
    InsertionFailure { occupancy: usize },

    /// The xor filter failed to peel after the bounded number of hash
    /// reseeds. The caller must enlarge the table.
    #[error("xor filter failed to peel after {attempts} reseeds")]
    BuildFailure { attempts: usize },

    /// A suffix-vector operation was called on a vector of the wrong kind.
    #[error("invalid suffix vector usage: {0}")]
    Usage(&'static str),

    /// The provided configuration values are invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
