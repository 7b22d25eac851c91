//! Per-subject mutation serialization
//!
//! Every subject gets its own FIFO async mutex (tokio's mutex grants the lock
//! in request order). Operations on the same subject run one at a time in
//! submission order; different subjects never wait on each other. The entry
//! for a subject disappears once nobody holds or waits for it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type Slot = Arc<AsyncMutex<()>>;

/// Process-scoped registry of per-subject locks
#[derive(Debug, Default)]
pub struct SubjectLock {
    slots: Mutex<HashMap<i64, Slot>>,
}

impl SubjectLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock of `subject_id`
    ///
    /// The lock is released when `f` completes, fails, panics or is dropped.
    /// Whatever `f` returns (including an error) is handed back unchanged.
    pub async fn with_lock<F, Fut, T>(&self, subject_id: i64, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(subject_id).await;
        f().await
    }

    /// Waits for the lock of `subject_id` and returns its guard
    pub async fn acquire(&self, subject_id: i64) -> SubjectGuard<'_> {
        let slot = {
            let mut slots = self.slots();
            slots.entry(subject_id).or_default().clone()
        };
        let reservation = Reservation {
            owner: self,
            subject_id,
            slot,
        };
        trace!(subject_id, "waiting for subject lock");
        let permit = reservation.slot.clone().lock_owned().await;
        trace!(subject_id, "subject lock acquired");
        SubjectGuard {
            _permit: permit,
            _reservation: reservation,
        }
    }

    /// Number of subjects currently holding or waiting for a lock
    pub fn active_subjects(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<i64, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a subject's slot alive while someone waits for or holds it
#[derive(Debug)]
struct Reservation<'a> {
    owner: &'a SubjectLock,
    subject_id: i64,
    slot: Slot,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut slots = self.owner.slots();
        // Remaining references: the map and this reservation.
        let drained = slots
            .get(&self.subject_id)
            .map(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(&self.slot) == 2)
            .unwrap_or(false);
        if drained {
            slots.remove(&self.subject_id);
            trace!(subject_id = self.subject_id, "subject lock entry pruned");
        }
    }
}

/// Held lock of one subject; dropping it releases the lock
#[derive(Debug)]
pub struct SubjectGuard<'a> {
    // Field order matters: the permit must be released before the
    // reservation checks whether the slot is drained.
    _permit: OwnedMutexGuard<()>,
    _reservation: Reservation<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_subject_runs_in_submission_order() {
        let lock = Arc::new(SubjectLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let lock = lock.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                lock.with_lock(7, || async move {
                    // Earlier tasks sleep longer: only FIFO locking keeps the order.
                    tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                    order.lock().unwrap().push(i);
                })
                .await
            }));
            // Submission order is the spawn order.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(lock.active_subjects(), 0);
    }

    #[tokio::test]
    async fn test_different_subjects_do_not_block() {
        let lock = Arc::new(SubjectLock::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for subject in 1..=3i64 {
            let lock = lock.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                lock.with_lock(subject, || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_releases_lock() {
        let lock = SubjectLock::new();

        let result: Result<(), &str> = lock.with_lock(1, || async { Err("boom") }).await;
        assert_eq!(result, Err("boom"));
        assert_eq!(lock.active_subjects(), 0);

        let ok: Result<u32, &str> = lock.with_lock(1, || async { Ok(5) }).await;
        assert_eq!(ok, Ok(5));
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiters_remain() {
        let lock = SubjectLock::new();
        let guard = lock.acquire(3).await;
        assert_eq!(lock.active_subjects(), 1);

        let waiter = lock.acquire(3);
        tokio::pin!(waiter);
        // The waiter cannot make progress while the guard is held.
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut waiter)
                .await
                .is_err()
        );
        drop(guard);

        let second = waiter.await;
        assert_eq!(lock.active_subjects(), 1);
        drop(second);
        assert_eq!(lock.active_subjects(), 0);
    }

    #[tokio::test]
    async fn test_panic_releases_lock() {
        let lock = Arc::new(SubjectLock::new());
        let inner = lock.clone();
        let result = tokio::spawn(async move {
            inner
                .with_lock(9, || async {
                    panic!("operation failed");
                })
                .await
        })
        .await;
        assert!(result.is_err());

        let value = tokio::time::timeout(
            Duration::from_secs(1),
            lock.with_lock(9, || async { 42 }),
        )
        .await
        .unwrap();
        assert_eq!(value, 42);
    }
}
