use std::sync::Arc;

use async_trait::async_trait;
use idvet_types::Address;

use crate::error::{VerifyError, VerifyResult};

/// The downstream verification capability.
///
/// `verify` marks zero or more of the given addresses as verified and may
/// fail. Throttling is optional: the default implementations fail fast with
/// [`VerifyError::Unsupported`].
#[async_trait]
pub trait AddressVerifier: Send + Sync {
    /// Human-readable name of this verifier variant.
    fn name(&self) -> &str;

    async fn verify(&self, addresses: &[Arc<Address>]) -> VerifyResult<()>;

    fn throttle_up(&self, by: usize) -> VerifyResult<()> {
        let _ = by;
        Err(VerifyError::unsupported("throttle_up", self.name()))
    }

    fn throttle_down(&self, by: usize) -> VerifyResult<()> {
        let _ = by;
        Err(VerifyError::unsupported("throttle_down", self.name()))
    }

    /// Release resources. Further calls to `verify` may fail with
    /// [`VerifyError::Closed`].
    async fn close(&self) {}
}

/// Shared handle to any verifier variant.
pub type SharedVerifier = Arc<dyn AddressVerifier>;
