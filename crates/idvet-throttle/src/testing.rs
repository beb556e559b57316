//! Instrumented verifiers shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use idvet_types::{Address, AddressId, IdGenerator};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::{VerifyError, VerifyResult};
use crate::verifier::AddressVerifier;

pub fn addresses(ids: &IdGenerator, n: usize) -> Vec<Arc<Address>> {
    (0..n)
        .map(|i| Arc::new(Address::new(ids, format!("{i} Main St"), "Springfield", "IL", "62701")))
        .collect()
}

/// Records the address ids of every call and marks everything verified.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Vec<AddressId>>>,
    fail: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn calls(&self) -> Vec<Vec<AddressId>> {
        self.calls.lock().clone()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl AddressVerifier for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn verify(&self, addresses: &[Arc<Address>]) -> VerifyResult<()> {
        self.calls
            .lock()
            .push(addresses.iter().map(|a| a.id()).collect());
        if self.fail {
            return Err(VerifyError::delegate_msg("recorder failure"));
        }
        for addr in addresses {
            let _ = addr.mark_verified(true);
        }
        Ok(())
    }
}

/// Blocks every call until the test releases it; tracks concurrency.
pub struct Gated {
    release: Semaphore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    entered: AtomicUsize,
}

impl Gated {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
        })
    }

    pub fn release(&self, n: usize) {
        self.release.add_permits(n);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressVerifier for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn verify(&self, _addresses: &[Arc<Address>]) -> VerifyResult<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let permit = self.release.acquire().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match permit {
            Ok(p) => {
                p.forget();
                Ok(())
            }
            Err(_) => Err(VerifyError::Cancelled),
        }
    }
}
