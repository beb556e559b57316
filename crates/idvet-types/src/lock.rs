use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

/// Lock scoped to a single identity record.
///
/// Two parts: an ownership mutex that merging writers take **without waiting**
/// through [`try_acquire`](Self::try_acquire), and the published value, which
/// readers take as an immutable [`Arc`] snapshot. A writer edits a private
/// draft and publishes it with [`RecordGuard::commit`], so readers never
/// observe a half-applied merge and never make a writer's acquisition fail.
///
/// The lock counts concurrent exclusive holders and remembers the peak, so
/// callers can assert that exclusivity was never violated.
#[derive(Debug, Default)]
pub struct RecordLock<T> {
    current: RwLock<Arc<T>>,
    owner: Mutex<()>,
    holders: AtomicUsize,
    peak_holders: AtomicUsize,
}

impl<T: Clone> RecordLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            owner: Mutex::new(()),
            holders: AtomicUsize::new(0),
            peak_holders: AtomicUsize::new(0),
        }
    }

    /// Try to take ownership without waiting.
    ///
    /// Returns `None` only while another guard is alive; snapshots held by
    /// readers do not count.
    pub fn try_acquire(&self) -> Option<RecordGuard<'_, T>> {
        let owner = self.owner.try_lock()?;
        let now = self.holders.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_holders.fetch_max(now, Ordering::AcqRel);
        let draft = T::clone(&self.read());
        Some(RecordGuard {
            lock: self,
            draft,
            _owner: owner,
        })
    }

    /// The last published value.
    pub fn read(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Direct access when the record is not shared yet.
    pub fn get_mut(&mut self) -> &mut T {
        Arc::make_mut(self.current.get_mut())
    }

    /// `true` while an exclusive guard is alive.
    pub fn is_held(&self) -> bool {
        self.holders.load(Ordering::Acquire) > 0
    }

    /// Largest number of exclusive guards ever alive at the same time.
    pub fn peak_holders(&self) -> usize {
        self.peak_holders.load(Ordering::Acquire)
    }

    fn publish(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}

/// Exclusive guard returned by [`RecordLock::try_acquire`].
///
/// Edits go to a draft that becomes visible on [`commit`](Self::commit).
/// Dropping the guard without committing discards the draft. Ownership is
/// released on every exit path, including unwinds.
pub struct RecordGuard<'a, T: Clone> {
    lock: &'a RecordLock<T>,
    draft: T,
    _owner: MutexGuard<'a, ()>,
}

impl<T: Clone> RecordGuard<'_, T> {
    /// Publish the draft and release ownership.
    pub fn commit(self) {
        self.lock.publish(self.draft.clone());
    }
}

impl<T: Clone> Deref for RecordGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.draft
    }
}

impl<T: Clone> DerefMut for RecordGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.draft
    }
}

impl<T: Clone> Drop for RecordGuard<'_, T> {
    fn drop(&mut self) {
        // Runs before the owner guard field is dropped, so the count never
        // lags behind a new holder.
        self.lock.holders.fetch_sub(1, Ordering::AcqRel);
    }
}
