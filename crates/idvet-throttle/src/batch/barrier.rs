use std::sync::Arc;

use idvet_types::Address;
use parking_lot::Mutex;
use tracing::debug;

use super::{BatchCore, BatchHandle, FlushReason};
use crate::config::BatchConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::verifier::SharedVerifier;

/// Cyclic barrier with a generation counter and resizable party count.
///
/// Arrivals never block: the arrival that completes a generation trips the
/// barrier, and a timer started by the first arrival of a generation breaks it
/// if the generation is still open when the timeout elapses.
struct GenerationBarrier {
    state: Mutex<BarrierState>,
}

struct BarrierState {
    parties: usize,
    arrived: usize,
    generation: u64,
}

enum Arrival {
    Waiting,
    /// First arrival of this generation; a timer must be started.
    Opened(u64),
    /// The generation is complete; flush up to this many items.
    Tripped(usize),
}

impl BarrierState {
    fn release(&mut self) -> usize {
        self.arrived = 0;
        self.generation += 1;
        self.parties
    }

    /// Release one generation per full batch among the arrivals already
    /// counted. Leftover arrivals carry into the open generation.
    fn release_full(&mut self) -> usize {
        let mut released = 0;
        while self.arrived > 0 && self.arrived >= self.parties {
            let leftover = self.arrived - self.parties;
            self.release();
            self.arrived = leftover;
            released += 1;
        }
        released
    }
}

impl GenerationBarrier {
    fn new(parties: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                parties,
                arrived: 0,
                generation: 0,
            }),
        }
    }

    fn arrive(&self) -> Arrival {
        let mut state = self.state.lock();
        state.arrived += 1;
        if state.arrived >= state.parties {
            Arrival::Tripped(state.release())
        } else if state.arrived == 1 {
            Arrival::Opened(state.generation)
        } else {
            Arrival::Waiting
        }
    }

    /// Break `generation` if it is still open. Returns the flush limit.
    fn expire(&self, generation: u64) -> Option<usize> {
        let mut state = self.state.lock();
        (state.generation == generation && state.arrived > 0).then(|| state.release())
    }
}

/// Batcher driven by a [`GenerationBarrier`].
pub struct BarrierBatcher {
    core: Arc<BatchCore>,
    barrier: Arc<GenerationBarrier>,
}

impl BarrierBatcher {
    pub fn new(delegate: SharedVerifier, config: BatchConfig) -> VerifyResult<Self> {
        let core = BatchCore::new(delegate, config)?;
        Ok(Self {
            core,
            barrier: Arc::new(GenerationBarrier::new(config.batch_size)),
        })
    }

    pub fn submit(&self, items: Vec<Arc<Address>>) -> VerifyResult<BatchHandle> {
        self.core.submit_with(items, || self.arrive())
    }

    fn arrive(&self) {
        match self.barrier.arrive() {
            Arrival::Waiting => {}
            Arrival::Opened(generation) => self.start_timer(generation),
            Arrival::Tripped(limit) => {
                self.core.flush(limit, FlushReason::Full);
            }
        }
    }

    fn start_timer(&self, generation: u64) {
        let core = Arc::clone(&self.core);
        let barrier = Arc::clone(&self.barrier);
        tokio::spawn(async move {
            tokio::time::sleep(core.timeout()).await;
            if let Some(limit) = barrier.expire(generation) {
                debug!(generation, "barrier generation timed out");
                core.flush(limit, FlushReason::Timeout);
            }
        });
    }

    /// Apply `resize` to the party count. Trips the barrier once per full
    /// batch already waiting; any remainder opens a new timed generation.
    pub(crate) fn resize(&self, resize: impl FnOnce(usize) -> Option<usize>) -> VerifyResult<()> {
        let (parties, released, opened) = {
            let mut state = self.barrier.state.lock();
            let parties = resize(state.parties).ok_or_else(|| {
                VerifyError::InvalidThrottle(format!(
                    "batch size {} cannot be resized that far",
                    state.parties
                ))
            })?;
            state.parties = parties;
            self.core.set_batch_size(parties);
            debug!(parties, "barrier resized");
            let released = state.release_full();
            let opened = (released > 0 && state.arrived > 0).then_some(state.generation);
            (parties, released, opened)
        };
        for _ in 0..released {
            self.core.flush(parties, FlushReason::Full);
        }
        if let Some(generation) = opened {
            self.start_timer(generation);
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.core.shutdown().await;
    }

    pub(crate) fn core(&self) -> &Arc<BatchCore> {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_every_parties_arrivals() {
        let barrier = GenerationBarrier::new(3);
        assert!(matches!(barrier.arrive(), Arrival::Opened(0)));
        assert!(matches!(barrier.arrive(), Arrival::Waiting));
        assert!(matches!(barrier.arrive(), Arrival::Tripped(3)));
        assert!(matches!(barrier.arrive(), Arrival::Opened(1)));
    }

    #[test]
    fn expiry_only_breaks_the_open_generation() {
        let barrier = GenerationBarrier::new(2);
        assert!(matches!(barrier.arrive(), Arrival::Opened(0)));
        assert!(matches!(barrier.arrive(), Arrival::Tripped(2)));
        assert_eq!(barrier.expire(0), None);

        assert!(matches!(barrier.arrive(), Arrival::Opened(1)));
        assert_eq!(barrier.expire(1), Some(2));
        assert_eq!(barrier.expire(1), None);
    }

    #[test]
    fn shrinking_releases_every_full_batch_and_keeps_the_rest() {
        let barrier = GenerationBarrier::new(10);
        for _ in 0..5 {
            barrier.arrive();
        }
        let released = {
            let mut state = barrier.state.lock();
            state.parties = 2;
            state.release_full()
        };
        assert_eq!(released, 2);
        assert_eq!(barrier.expire(1), None);
        assert_eq!(barrier.expire(2), Some(2));
    }

    #[test]
    fn single_party_trips_on_every_arrival() {
        let barrier = GenerationBarrier::new(1);
        assert!(matches!(barrier.arrive(), Arrival::Tripped(1)));
        assert!(matches!(barrier.arrive(), Arrival::Tripped(1)));
    }
}
