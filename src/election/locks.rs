use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rocket::tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A table of per-key async locks.
///
/// Operations on the same voter or ballot are serialised; operations on
/// different keys proceed in parallel. Entries nobody holds or waits on are
/// pruned whenever a new lock is taken.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Proof that a key is locked. The lock is released on drop.
pub type KeyGuard = OwnedMutexGuard<()>;

impl KeyLocks {
    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Lock several keys at once, in a fixed order so that callers locking
    /// overlapping sets cannot deadlock.
    pub async fn lock_all(&self, keys: &[&str]) -> Vec<KeyGuard> {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rocket::tokio::{self, time::timeout};

    use super::*;

    #[rocket::async_test]
    async fn same_key_is_exclusive() {
        let locks = KeyLocks::default();
        let guard = locks.lock("voter").await;
        assert!(timeout(Duration::from_millis(50), locks.lock("voter"))
            .await
            .is_err());
        // Other keys are unaffected.
        let _other = locks.lock("ballot").await;
        drop(guard);
        let _again = locks.lock("voter").await;
    }

    #[rocket::async_test]
    async fn overlapping_sets_do_not_deadlock() {
        let locks = Arc::new(KeyLocks::default());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let locks = locks.clone();
            tasks.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 { ["a", "b"] } else { ["b", "a"] };
                let _guards = locks.lock_all(&keys).await;
                tokio::task::yield_now().await;
            }));
        }
        for task in tasks {
            timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        }
    }

    #[rocket::async_test]
    async fn released_entries_are_pruned() {
        let locks = KeyLocks::default();
        drop(locks.lock("first").await);
        drop(locks.lock("second").await);
        let _held = locks.lock("third").await;
        assert_eq!(locks.len(), 1);
    }
}
