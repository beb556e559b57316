use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{VerifyError, VerifyResult};

/// A counting permit pool whose size can change at runtime.
///
/// Growing adds permits immediately. Shrinking forgets idle permits right
/// away and records the rest as debt; permits that come back while debt is
/// outstanding are forgotten instead of returned. Permits already handed out
/// are never revoked.
#[derive(Clone)]
pub struct PermitPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    semaphore: Arc<Semaphore>,
    total: Mutex<usize>,
    debt: AtomicUsize,
    closing: AtomicBool,
}

impl PoolInner {
    fn take_debt(&self) -> bool {
        self.debt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1))
            .is_ok()
    }

    /// Forget idle permits while debt is outstanding.
    fn settle_idle(&self) -> usize {
        let mut settled = 0;
        while self.debt.load(Ordering::Acquire) > 0 {
            let Ok(idle) = self.semaphore.try_acquire() else {
                break;
            };
            if !self.take_debt() {
                break;
            }
            idle.forget();
            settled += 1;
        }
        settled
    }

    fn wrap(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> VerifyResult<Permit> {
        let permit = Permit {
            permit: Some(permit),
            pool: Arc::clone(self),
        };
        if self.closing.load(Ordering::Acquire) {
            return Err(VerifyError::Closed);
        }
        Ok(permit)
    }
}

impl PermitPool {
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(permits)),
                total: Mutex::new(permits),
                debt: AtomicUsize::new(0),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Wait for a permit. Fails with [`VerifyError::Closed`] once the pool is
    /// closed, including for callers already waiting.
    pub async fn acquire(&self) -> VerifyResult<Permit> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| VerifyError::Closed)?;
        self.inner.wrap(permit)
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;
        self.inner.wrap(permit).ok()
    }

    /// Add `by` permits, first paying down any outstanding debt.
    pub fn increase(&self, by: usize) -> usize {
        let mut total = self.inner.total.lock();
        let mut fresh = by;
        while fresh > 0 && self.inner.take_debt() {
            fresh -= 1;
        }
        if fresh > 0 {
            self.inner.semaphore.add_permits(fresh);
        }
        *total += by;
        debug!(by, total = *total, "permit pool grown");
        *total
    }

    /// Remove `by` permits. The pool never shrinks below one permit.
    pub fn decrease(&self, by: usize) -> VerifyResult<usize> {
        let mut total = self.inner.total.lock();
        if by >= *total {
            return Err(VerifyError::InvalidThrottle(format!(
                "cannot remove {by} of {} permits",
                *total
            )));
        }
        let mut owed = by;
        while owed > 0 {
            match self.inner.semaphore.try_acquire() {
                Ok(idle) => {
                    idle.forget();
                    owed -= 1;
                }
                Err(_) => break,
            }
        }
        self.inner.debt.fetch_add(owed, Ordering::AcqRel);
        // A permit returned after the loop above went to the semaphore.
        owed -= self.inner.settle_idle().min(owed);
        *total -= by;
        debug!(by, total = *total, deferred = owed, "permit pool shrunk");
        Ok(*total)
    }

    /// Configured number of permits.
    pub fn total(&self) -> usize {
        *self.inner.total.lock()
    }

    /// Permits free right now.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Permits currently held by callers.
    pub fn in_use(&self) -> usize {
        let total = self.total() + self.inner.debt.load(Ordering::Acquire);
        total.saturating_sub(self.available())
    }

    /// Reject queued and future callers, wait for every held permit to come
    /// back, then close.
    pub async fn drain_and_close(&self) {
        self.inner.closing.store(true, Ordering::Release);
        let total = u32::try_from(self.total()).unwrap_or(u32::MAX);
        // Waiters queued ahead are handed a permit, see `closing`, and give
        // it straight back.
        let all = self.inner.semaphore.acquire_many(total).await;
        self.close();
        drop(all);
        debug!(total, "permit pool drained");
    }

    /// Reject all current and future waiters. Held permits stay valid.
    pub fn close(&self) {
        self.inner.closing.store(true, Ordering::Release);
        self.inner.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire) || self.inner.semaphore.is_closed()
    }
}

/// A held permit; returned to the pool (or forgotten to settle debt) on drop.
pub struct Permit {
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            if self.pool.take_debt() {
                permit.forget();
            }
        }
    }
}
