//! Named async mutexes.
//!
//! Used to serialize mutating work per host (configuration writes and
//! service reloads) and per orchestrated resource within one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// A map of lazily created `tokio` mutexes keyed by name.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedLocks {
    /// Wait for and acquire the lock named `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        mutex.lock_owned().await
    }

    /// Acquire the lock only if it is free right now.
    pub fn try_lock(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        mutex.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::default();
        let guard = locks.lock("web1").await;
        assert!(locks.try_lock("web1").is_none());
        drop(guard);
        assert!(locks.try_lock("web1").is_some());
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let locks = KeyedLocks::default();
        let _a = locks.lock("web1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("web2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn waiter_acquires_after_release() {
        let locks = KeyedLocks::default();
        let guard = locks.lock("site:1").await;
        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock("site:1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
