/// Errors raised while normalising contact fields.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    /// The value does not contain exactly one `@`.
    #[error("invalid email address '{0}'")]
    InvalidEmail(String),
}

/// Errors that stop ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Reading the source failed; the stream ends here.
    #[error("I/O error at line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline worker task panicked or was cancelled.
    #[error("pipeline task failed: {0}")]
    Task(String),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for ingest operations.
pub type IngestResult<T> = Result<T, IngestError>;
