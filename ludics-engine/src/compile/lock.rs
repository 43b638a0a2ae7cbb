//! Per-dialogue compile lock
//!
//! One FIFO async mutex per dialogue key. Entries are created on first use
//! and removed when the last holder releases with nobody queued.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
struct Registry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Registry {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // The map is only touched in short non-panicking sections
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keyed cooperative mutex serializing recompilation per dialogue
#[derive(Debug, Clone, Default)]
pub struct CompileLock {
    registry: Arc<Registry>,
}

/// Exclusive hold on one dialogue key; released on drop
#[derive(Debug)]
pub struct CompileGuard {
    key: String,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<Registry>,
}

impl CompileGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CompileGuard {
    fn drop(&mut self) {
        // Release first so the guard's own reference is gone before counting
        drop(self.guard.take());
        let mut slots = self.registry.slots();
        // One reference in the map, one here: nobody else holds or waits
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
            trace!(key = %self.key, "Compile lock slot released");
        }
    }
}

impl CompileLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`, queued FIFO behind earlier callers
    pub async fn acquire(&self, key: &str) -> CompileGuard {
        let slot = {
            let mut slots = self.registry.slots();
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        trace!(key, "Compile lock acquired");
        CompileGuard {
            key: key.to_string(),
            slot,
            guard: Some(guard),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Run `f` while holding the lock for `key`
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        f().await
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.registry.slots().len()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.registry.slots().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_slot_cleaned_up_after_release() {
        let lock = CompileLock::new();
        {
            let guard = lock.acquire("d1").await;
            assert_eq!(guard.key(), "d1");
            assert!(lock.is_active("d1"));
        }
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let lock = CompileLock::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                lock.with_lock("d1", || async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_waiters_run_in_arrival_order() {
        let lock = CompileLock::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = lock.acquire("d1").await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let lock = lock.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _g = lock.acquire("d1").await;
                order.lock().unwrap().push(i);
            }));
            // Let each waiter enqueue before the next is spawned
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(first);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let lock = CompileLock::new();
        let _a = lock.acquire("d1").await;
        let b = tokio::time::timeout(Duration::from_millis(50), lock.acquire("d2")).await;
        assert!(b.is_ok());
    }
}
