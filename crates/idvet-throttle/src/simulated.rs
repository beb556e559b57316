use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use idvet_types::Address;
use tracing::{debug, trace};

use crate::error::{VerifyError, VerifyResult};
use crate::verifier::AddressVerifier;

/// In-process stand-in for a remote verification service.
///
/// Sleeps for a fixed latency per call, then marks an address verified when
/// its zip code is non-empty and all digits.
pub struct SimulatedVerifier {
    latency: Duration,
    fail: bool,
    calls: AtomicU64,
    checked: AtomicU64,
    closed: AtomicBool,
}

impl SimulatedVerifier {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail: false,
            calls: AtomicU64::new(0),
            checked: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// A verifier whose every call fails.
    pub fn failing(latency: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(latency)
        }
    }

    /// Delegate calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Addresses received so far across all calls.
    pub fn checked(&self) -> u64 {
        self.checked.load(Ordering::Relaxed)
    }

    pub fn is_valid_zip(zip: &str) -> bool {
        !zip.is_empty() && zip.chars().all(|c| c.is_ascii_digit())
    }
}

#[async_trait]
impl AddressVerifier for SimulatedVerifier {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn verify(&self, addresses: &[Arc<Address>]) -> VerifyResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VerifyError::Closed);
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.checked
            .fetch_add(addresses.len() as u64, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(VerifyError::delegate_msg("simulated verification outage"));
        }
        for address in addresses {
            let valid = Self::is_valid_zip(address.zip_code());
            if let Err(err) = address.mark_verified(valid) {
                trace!(error = %err, "address already settled");
            }
        }
        debug!(count = addresses.len(), "simulated verification done");
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
