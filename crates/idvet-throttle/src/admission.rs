use std::sync::Arc;

use async_trait::async_trait;
use idvet_types::Address;
use tracing::{debug, warn};

use crate::error::VerifyResult;
use crate::permits::PermitPool;
use crate::verifier::{AddressVerifier, SharedVerifier};

/// Limits how many delegate calls may run at once.
///
/// Each `verify` call holds one permit for the duration of the delegate call.
/// The permit is released on every exit path, including delegate failure and
/// the caller dropping the future. `close` rejects callers not yet admitted,
/// waits for admitted calls to finish, then closes the delegate.
pub struct AdmissionGate {
    delegate: SharedVerifier,
    permits: PermitPool,
}

impl AdmissionGate {
    pub fn new(delegate: SharedVerifier, permits: usize) -> Self {
        Self {
            delegate,
            permits: PermitPool::new(permits),
        }
    }

    /// Configured number of permits.
    pub fn permits(&self) -> usize {
        self.permits.total()
    }

    /// Delegate calls currently admitted.
    pub fn in_flight(&self) -> usize {
        self.permits.in_use()
    }
}

#[async_trait]
impl AddressVerifier for AdmissionGate {
    fn name(&self) -> &str {
        "admission"
    }

    async fn verify(&self, addresses: &[Arc<Address>]) -> VerifyResult<()> {
        let _permit = self.permits.acquire().await?;
        debug!(count = addresses.len(), "admitted verification call");
        let result = self.delegate.verify(addresses).await;
        if let Err(err) = &result {
            warn!(error = %err, "delegate verification failed");
        }
        result
    }

    fn throttle_up(&self, by: usize) -> VerifyResult<()> {
        self.permits.increase(by);
        Ok(())
    }

    fn throttle_down(&self, by: usize) -> VerifyResult<()> {
        self.permits.decrease(by).map(|_| ())
    }

    async fn close(&self) {
        self.permits.drain_and_close().await;
        self.delegate.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;
    use crate::testing::{addresses, Gated, Recorder};
    use idvet_types::IdGenerator;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_permit_count() {
        let gated = Gated::new();
        let gate = Arc::new(AdmissionGate::new(gated.clone(), 3));
        let ids = IdGenerator::new();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let batch = addresses(&ids, 1);
                tokio::spawn(async move { gate.verify(&batch).await })
            })
            .collect();

        settle().await;
        assert_eq!(gated.in_flight(), 3);
        assert_eq!(gate.in_flight(), 3);

        gated.release(10);
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(gated.peak(), 3);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn delegate_failure_releases_permit() {
        let gate = AdmissionGate::new(Recorder::failing(), 1);
        let ids = IdGenerator::new();
        for _ in 0..3 {
            let err = gate.verify(&addresses(&ids, 2)).await.unwrap_err();
            assert!(matches!(err, VerifyError::Delegate(_)));
        }
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_caller_releases_permit() {
        let gated = Gated::new();
        let gate = Arc::new(AdmissionGate::new(gated.clone(), 1));
        let ids = IdGenerator::new();
        let batch = addresses(&ids, 1);
        let task = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.verify(&batch).await })
        };
        settle().await;
        assert_eq!(gate.in_flight(), 1);
        task.abort();
        let _ = task.await;
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn throttle_changes_concurrency() {
        let gated = Gated::new();
        let gate = Arc::new(AdmissionGate::new(gated.clone(), 1));
        gate.throttle_up(2).unwrap();
        assert_eq!(gate.permits(), 3);

        let ids = IdGenerator::new();
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let batch = addresses(&ids, 1);
                tokio::spawn(async move { gate.verify(&batch).await })
            })
            .collect();
        settle().await;
        assert_eq!(gated.in_flight(), 3);

        gate.throttle_down(2).unwrap();
        assert_eq!(gate.permits(), 1);
        gated.release(5);
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(gate.throttle_down(1).is_err());
    }

    #[tokio::test]
    async fn closed_gate_rejects() {
        let recorder = Recorder::new();
        let gate = AdmissionGate::new(recorder.clone(), 2);
        let ids = IdGenerator::new();
        gate.verify(&addresses(&ids, 1)).await.unwrap();
        gate.close().await;
        assert_eq!(
            gate.verify(&addresses(&ids, 1)).await,
            Err(VerifyError::Closed)
        );
        assert_eq!(recorder.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_waits_for_admitted_calls() {
        let gated = Gated::new();
        let gate = Arc::new(AdmissionGate::new(gated.clone(), 2));
        let ids = IdGenerator::new();
        let spawn_call = |batch: Vec<Arc<Address>>| {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.verify(&batch).await })
        };
        let admitted: Vec<_> = (0..2).map(|_| spawn_call(addresses(&ids, 1))).collect();
        settle().await;
        let waiting = spawn_call(addresses(&ids, 1));
        settle().await;

        let closing = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.close().await })
        };
        settle().await;
        assert!(!closing.is_finished());
        assert_eq!(gate.in_flight(), 2);

        gated.release(2);
        closing.await.unwrap();
        for call in admitted {
            call.await.unwrap().unwrap();
        }
        assert_eq!(waiting.await.unwrap(), Err(VerifyError::Closed));
        assert_eq!(gated.entered(), 2);
        assert_eq!(gate.in_flight(), 0);
    }
}
