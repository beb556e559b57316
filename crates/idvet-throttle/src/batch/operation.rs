use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use idvet_types::Address;
use tokio::sync::watch;

use crate::error::{VerifyError, VerifyResult};

/// Completion signal shared by the items of one `submit` call.
///
/// Counts down once per item. The first failure reported by any batch that
/// carried one of the items becomes the outcome for the whole submission.
pub struct CountdownLatch {
    remaining: AtomicUsize,
    failure: OnceLock<VerifyError>,
    done: watch::Sender<bool>,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Arc<Self> {
        let (done, _) = watch::channel(count == 0);
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            failure: OnceLock::new(),
            done,
        })
    }

    pub fn count(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    pub fn count_down(&self, outcome: &VerifyResult<()>) {
        if let Err(err) = outcome {
            let _ = self.failure.set(err.clone());
        }
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.done.send_replace(true);
        }
    }

    /// Wait until every item has been through a delegate call.
    pub async fn wait(&self) -> VerifyResult<()> {
        let mut done = self.done.subscribe();
        done.wait_for(|complete| *complete)
            .await
            .map_err(|_| VerifyError::Cancelled)?;
        match self.failure.get() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// One queued item paired with the latch its submitter waits on.
///
/// An operation dropped without being completed counts its latch down as
/// [`VerifyError::Cancelled`], so a submitter is never left waiting.
pub struct BatchOperation {
    item: Arc<Address>,
    latch: Option<Arc<CountdownLatch>>,
}

impl BatchOperation {
    pub fn new(item: Arc<Address>, latch: Arc<CountdownLatch>) -> Self {
        Self {
            item,
            latch: Some(latch),
        }
    }

    pub fn item(&self) -> &Arc<Address> {
        &self.item
    }

    pub fn complete(mut self, outcome: &VerifyResult<()>) {
        if let Some(latch) = self.latch.take() {
            latch.count_down(outcome);
        }
    }
}

impl Drop for BatchOperation {
    fn drop(&mut self) {
        if let Some(latch) = self.latch.take() {
            latch.count_down(&Err(VerifyError::Cancelled));
        }
    }
}

/// Handle returned by a batcher's `submit`.
pub struct BatchHandle {
    latch: Arc<CountdownLatch>,
}

impl BatchHandle {
    pub(crate) fn new(latch: Arc<CountdownLatch>) -> Self {
        Self { latch }
    }

    /// Items of this submission not yet through a delegate call.
    pub fn pending(&self) -> usize {
        self.latch.count()
    }

    pub fn is_complete(&self) -> bool {
        self.latch.is_complete()
    }

    /// Wait for every batch carrying one of this submission's items.
    pub async fn wait(self) -> VerifyResult<()> {
        self.latch.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idvet_types::IdGenerator;

    fn op(ids: &IdGenerator, latch: &Arc<CountdownLatch>) -> BatchOperation {
        let addr = Arc::new(Address::new(ids, "s", "c", "st", "1"));
        BatchOperation::new(addr, Arc::clone(latch))
    }

    #[tokio::test]
    async fn empty_latch_is_complete() {
        let latch = CountdownLatch::new(0);
        assert!(latch.is_complete());
        assert_eq!(latch.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn completes_after_all_items() {
        let ids = IdGenerator::new();
        let latch = CountdownLatch::new(2);
        let a = op(&ids, &latch);
        let b = op(&ids, &latch);
        a.complete(&Ok(()));
        assert!(!latch.is_complete());
        b.complete(&Ok(()));
        assert!(latch.is_complete());
        assert_eq!(latch.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn any_failure_fails_the_submission() {
        let ids = IdGenerator::new();
        let latch = CountdownLatch::new(2);
        op(&ids, &latch).complete(&Err(VerifyError::delegate_msg("down")));
        op(&ids, &latch).complete(&Ok(()));
        assert_eq!(
            latch.wait().await,
            Err(VerifyError::delegate_msg("down"))
        );
    }

    #[tokio::test]
    async fn dropped_operation_cancels() {
        let ids = IdGenerator::new();
        let latch = CountdownLatch::new(1);
        drop(op(&ids, &latch));
        assert_eq!(latch.wait().await, Err(VerifyError::Cancelled));
    }

    #[tokio::test]
    async fn handle_wakes_waiter() {
        let ids = IdGenerator::new();
        let latch = CountdownLatch::new(1);
        let handle = BatchHandle::new(Arc::clone(&latch));
        assert_eq!(handle.pending(), 1);
        let pending = op(&ids, &latch);
        let waiter = tokio::spawn(handle.wait());
        tokio::task::yield_now().await;
        pending.complete(&Ok(()));
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }
}
