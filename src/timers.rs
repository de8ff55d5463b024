//! In-memory scheduling primitives shared by the engines
//!
//! [`TimerRegistry`] keeps at most one pending task per entity id and is
//! rebuilt from persisted state on startup. [`EntityLocks`] serialises
//! operations on one entity without blocking unrelated ones.

use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, oneshot};
use tokio::task::AbortHandle;

/// Wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Time left until `deadline_ms`, zero if it has passed
#[must_use]
pub fn until(deadline_ms: i64) -> Duration {
    u64::try_from(deadline_ms - now_ms()).map_or(Duration::ZERO, Duration::from_millis)
}

/// Deadline `after` from now, in epoch milliseconds
#[must_use]
pub fn deadline_after(after: Duration) -> i64 {
    now_ms().saturating_add(i64::try_from(after.as_millis()).unwrap_or(i64::MAX))
}

/// Pending tasks keyed by entity id.
///
/// Scheduling a key that already has a task aborts the old one. A finished
/// task removes its own entry, unless it has been replaced in the meantime.
pub struct TimerRegistry<K> {
    entries: Arc<DashMap<K, (u64, AbortHandle)>>,
    generation: Arc<AtomicU64>,
}

impl<K> Clone for TimerRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<K> Default for TimerRegistry<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K> TimerRegistry<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` as the only pending task for `key`
    pub fn schedule<F>(&self, key: K, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let entries = Arc::clone(&self.entries);
        let own_key = key.clone();

        let handle = tokio::spawn(async move {
            // The entry must exist before the task can finish and clean up
            if registered_rx.await.is_err() {
                return;
            }
            task.await;
            entries.remove_if(&own_key, |_, (current, _)| *current == generation);
        });

        if let Some((_, previous)) = self.entries.insert(key, (generation, handle.abort_handle())) {
            previous.abort();
        }
        let _ = registered_tx.send(());
    }

    /// Abort the pending task for `key`, returning whether there was one
    pub fn cancel(&self, key: &K) -> bool {
        self.entries
            .remove(key)
            .map(|(_, (_, handle))| handle.abort())
            .is_some()
    }

    #[must_use]
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-entity async mutexes.
///
/// Concurrent callers on the same key queue up in arrival order; different
/// keys never contend.
pub struct EntityLocks<K> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Clone for EntityLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<K> Default for EntityLocks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K> EntityLocks<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(key).or_default().value());
        lock.lock_owned().await
    }

    /// Drop the lock for an entity that no longer exists
    pub fn forget(&self, key: &K) {
        self.locks.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_until_is_zero_for_past_deadlines() {
        assert_eq!(until(now_ms() - 1_000), Duration::ZERO);
        let left = until(deadline_after(Duration::from_secs(60)));
        assert!(left > Duration::from_secs(58) && left <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_task_runs_and_cleans_up() {
        let timers = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timers.schedule(1u64, async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_scheduled(&1));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_previous_task() {
        let timers = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for delay in [200u64, 10] {
            let counter = Arc::clone(&fired);
            timers.schedule(7u64, async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let timers = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timers.schedule(3u64, async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timers.cancel(&3));
        assert!(!timers.cancel(&3));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_entity_locks_serialise_same_key() {
        let locks = EntityLocks::new();
        let guard = locks.acquire(1u64).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1u64).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different key is not blocked
        let _other = locks.acquire(2u64).await;

        drop(guard);
        waiter.await.unwrap();
    }
}
