use thiserror::Error;

pub type PocketfsResult<T> = Result<T, PocketfsError>;

#[derive(Debug, Error)]
pub enum PocketfsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("trust boundary copy failed: {0}")]
    TrustBoundary(String),

    /// A record's metadata disagrees with its storage mode (e.g. an inline
    /// record whose size exceeds the inline capacity). Always fatal to the
    /// operation; never silently repaired.
    #[error("storage inconsistency on record {record}: size {size} exceeds inline capacity {capacity}")]
    StorageInconsistency {
        record: u64,
        size: u64,
        capacity: u64,
    },

    #[error("mode conversion failed: {0}")]
    Conversion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
