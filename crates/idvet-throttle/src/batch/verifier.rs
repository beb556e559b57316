use std::sync::Arc;

use async_trait::async_trait;
use idvet_types::Address;

use super::Batcher;
use crate::error::VerifyResult;
use crate::verifier::AddressVerifier;

/// Exposes a [`Batcher`] through the [`AddressVerifier`] contract: each
/// `verify` call submits its addresses and waits for their batches.
pub struct BatchingVerifier {
    batcher: Batcher,
}

impl BatchingVerifier {
    pub fn new(batcher: Batcher) -> Self {
        Self { batcher }
    }

    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }
}

#[async_trait]
impl AddressVerifier for BatchingVerifier {
    fn name(&self) -> &str {
        self.batcher.name()
    }

    async fn verify(&self, addresses: &[Arc<Address>]) -> VerifyResult<()> {
        self.batcher.submit(addresses.to_vec())?.wait().await
    }

    fn throttle_up(&self, by: usize) -> VerifyResult<()> {
        self.batcher.throttle_up(by)
    }

    fn throttle_down(&self, by: usize) -> VerifyResult<()> {
        self.batcher.throttle_down(by)
    }

    async fn close(&self) {
        self.batcher.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::testing::{addresses, Recorder};
    use idvet_types::IdGenerator;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_verify_calls_share_batches() {
        let recorder = Recorder::new();
        let batcher = Batcher::barrier(
            recorder.clone(),
            BatchConfig {
                batch_size: 4,
                timeout: Duration::from_millis(100),
            },
        )
        .unwrap();
        let verifier = Arc::new(BatchingVerifier::new(batcher));
        let ids = IdGenerator::new();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let verifier = Arc::clone(&verifier);
                let batch = addresses(&ids, 1);
                tokio::spawn(async move {
                    verifier.verify(&batch).await?;
                    Ok::<_, crate::error::VerifyError>(batch[0].is_verified())
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }
        let sizes = recorder.call_sizes();
        assert_eq!(sizes.iter().sum::<usize>(), 8);
        assert!(sizes.len() < 8);
        verifier.close().await;
    }
}
