/// Errors returned by the merge engine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    /// The malformed sentinel can never be stored or merged.
    #[error("malformed record at line {line} cannot be resolved: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
