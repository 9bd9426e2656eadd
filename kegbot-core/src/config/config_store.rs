//! Versioned config snapshots with change notification.
//!
//! Readers take a cheap `Arc` snapshot and never hold a lock; writers swap
//! the whole value and bump the version, which wakes every
//! [`ConfigWatcher`].

use std::sync::Arc;
use tokio::sync::watch;

struct Versioned<T> {
    version: u64,
    value: Arc<T>,
}

/// Shared, swappable configuration value.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Versioned<T>>>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Versioned<T>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Versioned {
            version: 0,
            value: Arc::new(initial),
        });
        Self { tx: Arc::new(tx) }
    }

    /// Replace the stored value and notify all watchers.
    pub fn update(&self, value: T) -> u64 {
        let value = Arc::new(value);
        let mut version = 0;
        self.tx.send_modify(|current| {
            current.version += 1;
            current.value = value;
            version = current.version;
        });
        version
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.tx.borrow().value)
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait for the next update and return the new snapshot.
    ///
    /// Fails once every [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<T>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(Arc::clone(&self.rx.borrow_and_update().value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_notifies_watchers() {
        let store = ConfigStore::new(vec!["a"]);
        let mut watcher = store.subscribe();
        assert_eq!(store.version(), 0);

        assert_eq!(store.update(vec!["a", "b"]), 1);
        let snapshot = watcher.changed().await.unwrap();
        assert_eq!(*snapshot, vec!["a", "b"]);
        assert_eq!(*store.current(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_watcher_fails_when_store_dropped() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
