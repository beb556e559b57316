use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Errors surfaced by the verification layer.
///
/// The type is `Clone` so a single batch outcome can be handed to every
/// caller whose item was part of that batch.
#[derive(Clone, Debug, thiserror::Error)]
pub enum VerifyError {
    /// The gate was saturated; the request was never attempted.
    #[error("admission rejected: capacity of {capacity} exhausted")]
    AdmissionRejected { capacity: usize },

    /// The downstream verification call failed.
    #[error("delegate verification failed: {0}")]
    Delegate(Arc<dyn StdError + Send + Sync>),

    /// No address in the set survived verification.
    #[error("no valid addresses")]
    NoValidAddresses,

    /// The verifier variant does not support the requested operation.
    #[error("{operation} is not supported by {verifier}")]
    Unsupported {
        operation: &'static str,
        verifier: String,
    },

    /// The wait was abandoned before a result was produced.
    #[error("verification cancelled")]
    Cancelled,

    /// The verifier has been closed and admits no further work.
    #[error("verifier is closed")]
    Closed,

    /// A throttle request would leave the verifier without capacity.
    #[error("invalid throttle: {0}")]
    InvalidThrottle(String),
}

impl VerifyError {
    /// Wrap an arbitrary delegate failure.
    pub fn delegate(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Delegate(Arc::new(err))
    }

    /// Delegate failure described only by a message.
    pub fn delegate_msg(message: impl Into<String>) -> Self {
        Self::delegate(DelegateMessage(message.into()))
    }

    pub fn unsupported(operation: &'static str, verifier: impl Into<String>) -> Self {
        Self::Unsupported {
            operation,
            verifier: verifier.into(),
        }
    }

    /// Returns `true` if the request was turned away without being attempted.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. } | Self::Closed)
    }
}

impl PartialEq for VerifyError {
    fn eq(&self, other: &Self) -> bool {
        // Compare by display representation for test convenience.
        fmt::format(format_args!("{self}")) == fmt::format(format_args!("{other}"))
    }
}

impl Eq for VerifyError {}

/// Plain-text delegate failure.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DelegateMessage(pub String);

/// Result alias for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegate_message_is_preserved() {
        let err = VerifyError::delegate_msg("upstream 503");
        assert_eq!(err.to_string(), "delegate verification failed: upstream 503");
    }

    #[test]
    fn clones_compare_equal() {
        let err = VerifyError::delegate_msg("boom");
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn rejection_classification() {
        assert!(VerifyError::AdmissionRejected { capacity: 3 }.is_rejection());
        assert!(VerifyError::Closed.is_rejection());
        assert!(!VerifyError::NoValidAddresses.is_rejection());
        assert!(!VerifyError::delegate_msg("x").is_rejection());
    }

    #[test]
    fn unsupported_names_operation_and_verifier() {
        let err = VerifyError::unsupported("throttle_up", "simulated");
        assert_eq!(err.to_string(), "throttle_up is not supported by simulated");
    }
}
