use std::sync::Arc;

use async_trait::async_trait;
use idvet_types::Address;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{VerifyError, VerifyResult};
use crate::permits::PermitPool;
use crate::verifier::{AddressVerifier, SharedVerifier};

struct Job {
    addresses: Vec<Arc<Address>>,
    reply: oneshot::Sender<VerifyResult<()>>,
}

/// A fixed-capacity queue in front of a resizable pool of workers.
///
/// `verify` enqueues the call and waits for its result. When the queue is
/// full the call fails immediately with [`VerifyError::AdmissionRejected`]
/// instead of waiting. A dispatcher takes a worker permit before it takes a
/// job, so at most `workers + queue_capacity` calls are accepted at once.
///
/// Must be constructed inside a Tokio runtime.
pub struct BackpressureGate {
    delegate: SharedVerifier,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    drained: tokio::sync::Mutex<Option<mpsc::Receiver<()>>>,
    workers: PermitPool,
    queue_capacity: usize,
}

impl BackpressureGate {
    pub fn new(
        delegate: SharedVerifier,
        workers: usize,
        queue_capacity: usize,
    ) -> VerifyResult<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(VerifyError::InvalidThrottle(format!(
                "backpressure gate needs at least one worker and one queue slot \
                 (workers={workers}, queue={queue_capacity})"
            )));
        }
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let (done_tx, done_rx) = mpsc::channel(1);
        let pool = PermitPool::new(workers);
        tokio::spawn(dispatch(receiver, pool.clone(), Arc::clone(&delegate), done_tx));
        Ok(Self {
            delegate,
            sender: Mutex::new(Some(sender)),
            drained: tokio::sync::Mutex::new(Some(done_rx)),
            workers: pool,
            queue_capacity,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers.total()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Calls currently held by workers.
    pub fn busy_workers(&self) -> usize {
        self.workers.in_use()
    }

    fn capacity(&self) -> usize {
        self.workers() + self.queue_capacity
    }
}

async fn dispatch(
    mut jobs: mpsc::Receiver<Job>,
    workers: PermitPool,
    delegate: SharedVerifier,
    done: mpsc::Sender<()>,
) {
    loop {
        let Ok(permit) = workers.acquire().await else {
            break;
        };
        let Some(job) = jobs.recv().await else {
            break;
        };
        let delegate = Arc::clone(&delegate);
        let done = done.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _done = done;
            let result = delegate.verify(&job.addresses).await;
            // The caller may have gone away; nothing to report to.
            let _ = job.reply.send(result);
        });
    }
    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        let _ = job.reply.send(Err(VerifyError::Closed));
    }
    debug!("backpressure dispatcher stopped");
}

#[async_trait]
impl AddressVerifier for BackpressureGate {
    fn name(&self) -> &str {
        "backpressure"
    }

    async fn verify(&self, addresses: &[Arc<Address>]) -> VerifyResult<()> {
        let (reply, outcome) = oneshot::channel();
        let job = Job {
            addresses: addresses.to_vec(),
            reply,
        };
        {
            let guard = self.sender.lock();
            let sender = guard.as_ref().ok_or(VerifyError::Closed)?;
            sender.try_send(job).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    let capacity = self.capacity();
                    warn!(capacity, "backpressure queue full, rejecting");
                    VerifyError::AdmissionRejected { capacity }
                }
                mpsc::error::TrySendError::Closed(_) => VerifyError::Closed,
            })?;
        }
        outcome.await.map_err(|_| VerifyError::Cancelled)?
    }

    fn throttle_up(&self, by: usize) -> VerifyResult<()> {
        self.workers.increase(by);
        Ok(())
    }

    fn throttle_down(&self, by: usize) -> VerifyResult<()> {
        self.workers.decrease(by).map(|_| ())
    }

    /// Stop accepting work, let queued and running calls finish, then close
    /// the delegate.
    async fn close(&self) {
        self.sender.lock().take();
        if let Some(mut drained) = self.drained.lock().await.take() {
            // Resolves once the dispatcher and every worker task have exited.
            let _ = drained.recv().await;
        }
        self.delegate.close().await;
    }
}
