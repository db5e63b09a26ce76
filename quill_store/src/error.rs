use snafu::Snafu;

/// Store error types.
///
/// Duplicate keys get their own variant because callers must be able to
/// absorb them: a replay from the last checkpoint legitimately rewrites
/// documents that were persisted before the restart.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A write collided with an existing document under a unique index.
    #[snafu(display("duplicate key"))]
    DuplicateKey,
    /// Any other storage failure.
    #[snafu(display("store backend error: {message}"))]
    Backend { message: String },
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey)
    }
}

pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;
