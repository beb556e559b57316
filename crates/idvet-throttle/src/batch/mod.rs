//! Coalescing of individually submitted items into delegate batches.
//!
//! Both strategies share [`BatchCore`]: an unbounded job queue, an atomic
//! target size, and the flush that drains at most one batch, calls the
//! delegate once, and counts down every submitter's latch. They differ only
//! in the primitive that decides *when* to flush.

mod barrier;
mod operation;
mod phase;
mod verifier;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use idvet_types::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::BatchConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::verifier::SharedVerifier;

pub use barrier::BarrierBatcher;
pub use operation::{BatchHandle, BatchOperation, CountdownLatch};
pub use phase::PhaseBatcher;
pub use verifier::BatchingVerifier;

/// What released a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushReason {
    Full,
    Timeout,
    Close,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Full => "full",
            FlushReason::Timeout => "timeout",
            FlushReason::Close => "close",
        }
    }
}

/// Counters describing the batches sent so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub batches: u64,
    pub items: u64,
    pub full_flushes: u64,
    pub timeout_flushes: u64,
    pub close_flushes: u64,
}

#[derive(Default)]
struct StatCounters {
    batches: AtomicU64,
    items: AtomicU64,
    full: AtomicU64,
    timeout: AtomicU64,
    close: AtomicU64,
}

pub(crate) struct BatchCore {
    delegate: SharedVerifier,
    queue_tx: mpsc::UnboundedSender<BatchOperation>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<BatchOperation>>,
    queued: AtomicUsize,
    batch_size: AtomicUsize,
    timeout: Duration,
    closed: AtomicBool,
    in_flight: watch::Sender<usize>,
    stats: StatCounters,
}

impl BatchCore {
    fn new(delegate: SharedVerifier, config: BatchConfig) -> VerifyResult<Arc<Self>> {
        if config.batch_size == 0 {
            return Err(VerifyError::InvalidThrottle(
                "batch size must be at least 1".into(),
            ));
        }
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (in_flight, _) = watch::channel(0);
        Ok(Arc::new(Self {
            delegate,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            queued: AtomicUsize::new(0),
            batch_size: AtomicUsize::new(config.batch_size),
            timeout: config.timeout,
            closed: AtomicBool::new(false),
            in_flight,
            stats: StatCounters::default(),
        }))
    }

    fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Acquire)
    }

    fn set_batch_size(&self, size: usize) {
        self.batch_size.store(size, Ordering::Release);
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> VerifyResult<()> {
        if self.is_closed() {
            Err(VerifyError::Closed)
        } else {
            Ok(())
        }
    }

    fn enqueue(&self, op: BatchOperation) {
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.queue_tx.send(op).is_err() {
            // The operation came back inside the error and was dropped,
            // which cancels its latch.
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Drain up to `limit` queued items and hand them to the delegate in one
    /// call. Returns the number of items sent.
    fn flush(self: &Arc<Self>, limit: usize, reason: FlushReason) -> usize {
        let ops = {
            let mut queue = self.queue_rx.lock();
            let mut ops = Vec::with_capacity(limit);
            while ops.len() < limit {
                match queue.try_recv() {
                    Ok(op) => ops.push(op),
                    Err(_) => break,
                }
            }
            ops
        };
        if ops.is_empty() {
            return 0;
        }
        let count = ops.len();
        self.queued.fetch_sub(count, Ordering::AcqRel);
        self.record(reason, count);
        debug!(count, reason = reason.as_str(), "batch released");

        let flight = Flight::enter(Arc::clone(self));
        tokio::spawn(async move {
            let addresses: Vec<Arc<Address>> = ops.iter().map(|op| Arc::clone(op.item())).collect();
            let outcome = flight.core.delegate.verify(&addresses).await;
            if let Err(err) = &outcome {
                warn!(count, error = %err, "batch delegate call failed");
            }
            for op in ops {
                op.complete(&outcome);
            }
            drop(flight);
        });
        count
    }

    /// Flush everything still queued, one batch at a time.
    fn flush_remaining(self: &Arc<Self>) {
        while self.flush(self.batch_size().max(1), FlushReason::Close) > 0 {}
    }

    async fn wait_idle(&self) {
        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }

    /// Enqueue every item under one latch, calling `arrive` after each.
    fn submit_with(
        self: &Arc<Self>,
        items: Vec<Arc<Address>>,
        mut arrive: impl FnMut(),
    ) -> VerifyResult<BatchHandle> {
        self.ensure_open()?;
        let latch = CountdownLatch::new(items.len());
        for item in items {
            self.enqueue(BatchOperation::new(item, Arc::clone(&latch)));
            arrive();
        }
        if self.is_closed() {
            // Raced with close; do not leave these items stranded.
            self.flush_remaining();
        }
        Ok(BatchHandle::new(latch))
    }

    async fn shutdown(self: &Arc<Self>) {
        self.closed.store(true, Ordering::Release);
        self.flush_remaining();
        self.wait_idle().await;
        self.delegate.close().await;
    }

    fn record(&self, reason: FlushReason, count: usize) {
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        self.stats.items.fetch_add(count as u64, Ordering::Relaxed);
        let counter = match reason {
            FlushReason::Full => &self.stats.full,
            FlushReason::Timeout => &self.stats.timeout,
            FlushReason::Close => &self.stats.close,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> BatchStats {
        BatchStats {
            batches: self.stats.batches.load(Ordering::Relaxed),
            items: self.stats.items.load(Ordering::Relaxed),
            full_flushes: self.stats.full.load(Ordering::Relaxed),
            timeout_flushes: self.stats.timeout.load(Ordering::Relaxed),
            close_flushes: self.stats.close.load(Ordering::Relaxed),
        }
    }
}

/// Marks one delegate call in progress for as long as it is alive.
struct Flight {
    core: Arc<BatchCore>,
}

impl Flight {
    fn enter(core: Arc<BatchCore>) -> Self {
        core.in_flight.send_modify(|n| *n += 1);
        Self { core }
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        self.core.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Either batching strategy behind one interface.
pub enum Batcher {
    Barrier(BarrierBatcher),
    Phase(PhaseBatcher),
}

impl Batcher {
    pub fn barrier(delegate: SharedVerifier, config: BatchConfig) -> VerifyResult<Self> {
        BarrierBatcher::new(delegate, config).map(Batcher::Barrier)
    }

    /// Must be called inside a Tokio runtime; spawns the fetcher loop.
    pub fn phase(delegate: SharedVerifier, config: BatchConfig) -> VerifyResult<Self> {
        PhaseBatcher::new(delegate, config).map(Batcher::Phase)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Batcher::Barrier(_) => "barrier-batch",
            Batcher::Phase(_) => "phase-batch",
        }
    }

    /// Queue `items`; the handle completes once every batch that carried one
    /// of them has returned from the delegate.
    pub fn submit(&self, items: Vec<Arc<Address>>) -> VerifyResult<BatchHandle> {
        match self {
            Batcher::Barrier(b) => b.submit(items),
            Batcher::Phase(b) => b.submit(items),
        }
    }

    pub fn throttle_up(&self, by: usize) -> VerifyResult<()> {
        match self {
            Batcher::Barrier(b) => b.resize(|size| size.checked_add(by)),
            Batcher::Phase(b) => b.throttle_up(by),
        }
    }

    pub fn throttle_down(&self, by: usize) -> VerifyResult<()> {
        match self {
            Batcher::Barrier(b) => b.resize(|size| size.checked_sub(by).filter(|s| *s > 0)),
            Batcher::Phase(b) => b.throttle_down(by),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.core().batch_size()
    }

    pub fn queued(&self) -> usize {
        self.core().queued()
    }

    pub fn stats(&self) -> BatchStats {
        self.core().stats()
    }

    /// Reject new items, flush what is queued, and wait for every batch.
    pub async fn close(&self) {
        match self {
            Batcher::Barrier(b) => b.close().await,
            Batcher::Phase(b) => b.close().await,
        }
    }

    fn core(&self) -> &Arc<BatchCore> {
        match self {
            Batcher::Barrier(b) => b.core(),
            Batcher::Phase(b) => b.core(),
        }
    }
}
