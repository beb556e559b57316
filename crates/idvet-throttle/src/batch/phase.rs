use std::sync::Arc;

use idvet_types::Address;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BatchCore, BatchHandle, FlushReason};
use crate::config::BatchConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::verifier::SharedVerifier;

/// Phaser with dynamic registration.
///
/// Each arrival decrements the unarrived count; when it reaches zero the phase
/// advances and every party is expected again. The current phase is published
/// on a watch channel for the fetcher loop.
struct Phaser {
    state: Mutex<PhaseState>,
    phase: watch::Sender<u64>,
}

struct PhaseState {
    phase: u64,
    parties: usize,
    unarrived: usize,
}

impl PhaseState {
    fn advance(&mut self, phase: &watch::Sender<u64>) {
        self.phase += 1;
        self.unarrived = self.parties;
        phase.send_replace(self.phase);
    }
}

impl Phaser {
    fn new(parties: usize) -> Self {
        let (phase, _) = watch::channel(0);
        Self {
            state: Mutex::new(PhaseState {
                phase: 0,
                parties,
                unarrived: parties,
            }),
            phase,
        }
    }

    fn current(&self) -> u64 {
        self.state.lock().phase
    }

    fn arrive(&self) {
        let mut state = self.state.lock();
        state.unarrived = state.unarrived.saturating_sub(1);
        if state.unarrived == 0 {
            state.advance(&self.phase);
        }
    }

    /// Advance past `expected` if no arrival has done so already.
    fn force_advance(&self, expected: u64) -> bool {
        let mut state = self.state.lock();
        if state.phase != expected {
            return false;
        }
        state.advance(&self.phase);
        true
    }

    fn register(&self, by: usize) -> usize {
        let mut state = self.state.lock();
        state.parties += by;
        state.unarrived += by;
        state.parties
    }

    /// Remove `by` parties; arrivals already counted may complete the phase.
    fn deregister(&self, by: usize) -> VerifyResult<usize> {
        let mut state = self.state.lock();
        if by >= state.parties {
            return Err(VerifyError::InvalidThrottle(format!(
                "cannot deregister {by} of {} parties",
                state.parties
            )));
        }
        state.parties -= by;
        state.unarrived = state.unarrived.saturating_sub(by);
        if state.unarrived == 0 {
            state.advance(&self.phase);
        }
        Ok(state.parties)
    }
}

/// Batcher driven by a [`Phaser`] and a single fetcher loop.
///
/// The loop waits for the next phase with a timeout. Every phase advance
/// releases one batch; a timeout with items queued forces an advance and
/// releases a partial batch.
pub struct PhaseBatcher {
    core: Arc<BatchCore>,
    phaser: Arc<Phaser>,
    fetcher: Mutex<Option<JoinHandle<()>>>,
}

impl PhaseBatcher {
    pub fn new(delegate: SharedVerifier, config: BatchConfig) -> VerifyResult<Self> {
        let core = BatchCore::new(delegate, config)?;
        let phaser = Arc::new(Phaser::new(config.batch_size));
        let start = phaser.current();
        let fetcher = tokio::spawn(fetch_loop(Arc::clone(&core), Arc::clone(&phaser), start));
        Ok(Self {
            core,
            phaser,
            fetcher: Mutex::new(Some(fetcher)),
        })
    }

    pub fn submit(&self, items: Vec<Arc<Address>>) -> VerifyResult<BatchHandle> {
        self.core.submit_with(items, || self.phaser.arrive())
    }

    pub fn throttle_up(&self, by: usize) -> VerifyResult<()> {
        let parties = self.phaser.register(by);
        self.core.set_batch_size(parties);
        debug!(parties, "phaser parties registered");
        Ok(())
    }

    pub fn throttle_down(&self, by: usize) -> VerifyResult<()> {
        let parties = self.phaser.deregister(by)?;
        self.core.set_batch_size(parties);
        debug!(parties, "phaser parties deregistered");
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(fetcher) = self.fetcher.lock().take() {
            fetcher.abort();
        }
        self.core.shutdown().await;
    }

    pub(crate) fn core(&self) -> &Arc<BatchCore> {
        &self.core
    }
}

impl Drop for PhaseBatcher {
    fn drop(&mut self) {
        if let Some(fetcher) = self.fetcher.get_mut().take() {
            fetcher.abort();
        }
    }
}

async fn fetch_loop(core: Arc<BatchCore>, phaser: Arc<Phaser>, start: u64) {
    let mut phases = phaser.phase.subscribe();
    let mut local = start;
    loop {
        let target = local;
        let waited = tokio::time::timeout(core.timeout(), phases.wait_for(|p| *p > target))
            .await
            .map(|changed| changed.is_ok());
        match waited {
            Ok(true) => {
                local += 1;
                core.flush(core.batch_size(), FlushReason::Full);
            }
            Ok(false) => break,
            Err(_elapsed) => {
                if core.queued() > 0 && phaser.force_advance(local) {
                    local += 1;
                    core.flush(core.batch_size(), FlushReason::Timeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_after_all_parties_arrive() {
        let phaser = Phaser::new(2);
        phaser.arrive();
        assert_eq!(phaser.current(), 0);
        phaser.arrive();
        assert_eq!(phaser.current(), 1);
        assert_eq!(*phaser.phase.borrow(), 1);
    }

    #[test]
    fn force_advance_is_conditional() {
        let phaser = Phaser::new(5);
        phaser.arrive();
        assert!(phaser.force_advance(0));
        assert!(!phaser.force_advance(0));
        assert_eq!(phaser.current(), 1);
        assert_eq!(phaser.state.lock().unarrived, 5);
    }

    #[test]
    fn register_and_deregister() {
        let phaser = Phaser::new(3);
        assert_eq!(phaser.register(2), 5);
        phaser.arrive();
        phaser.arrive();
        assert_eq!(phaser.deregister(2).unwrap(), 3);
        assert_eq!(phaser.current(), 0);
        phaser.arrive();
        assert_eq!(phaser.current(), 1);
        assert!(phaser.deregister(3).is_err());
    }

    #[test]
    fn deregister_can_complete_phase() {
        let phaser = Phaser::new(4);
        phaser.arrive();
        phaser.arrive();
        phaser.deregister(2).unwrap();
        assert_eq!(phaser.current(), 1);
    }
}
