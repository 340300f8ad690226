//! Predecessor Watching
//!
//! Waits for the candidate immediately ahead of us to disappear. The
//! existence check arms the watch atomically, so a deletion can never
//! slip between the check and the watch.

use std::sync::Arc;

use super::state::CandidateKey;
use crate::error::{Error, Result, StoreError};
use crate::store::{join_path, CoordinationClient, Exists, WatchEvent};

/// How the predecessor went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The armed watch reported the deletion
    Deleted,
    /// The node was already absent when checked
    AlreadyGone,
}

/// Watches a single predecessor node at a time
pub struct PredecessorWatcher {
    client: Arc<dyn CoordinationClient>,
    root: String,
}

impl PredecessorWatcher {
    pub fn new(client: Arc<dyn CoordinationClient>, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    /// Resolve once `predecessor` no longer exists
    pub async fn watch_for(&self, predecessor: &CandidateKey) -> Result<WatchOutcome> {
        let path = join_path(&self.root, predecessor.as_str());

        loop {
            let exists = self
                .client
                .check_exists(&path)
                .await
                .map_err(|e| Error::store("check_exists", &path, e))?;

            let watch = match exists {
                Exists::Absent => {
                    tracing::debug!("predecessor {} already gone", predecessor);
                    return Ok(WatchOutcome::AlreadyGone);
                }
                Exists::Present(watch) => watch,
            };

            tracing::debug!("watching predecessor {}", predecessor);

            match watch.fired().await {
                WatchEvent::NodeDeleted => return Ok(WatchOutcome::Deleted),
                WatchEvent::Dropped => {
                    return Err(Error::store("watch", &path, StoreError::SessionExpired));
                }
                // Only removal matters; re-arm on anything else
                other => {
                    tracing::trace!("ignoring {:?} on {}", other, path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CreateMode, MemoryStore};
    use std::time::Duration;

    #[tokio::test]
    async fn test_already_gone() {
        let store = MemoryStore::new();
        let (client, _events) = store.connect().await;
        client.create("/election", &[], CreateMode::Persistent).await.unwrap();

        let watcher = PredecessorWatcher::new(Arc::new(client), "/election");
        let outcome = watcher
            .watch_for(&CandidateKey::new("p_0000000001"))
            .await
            .unwrap();
        assert_eq!(outcome, WatchOutcome::AlreadyGone);
        assert_eq!(store.pending_watches().await, 0);
    }

    #[tokio::test]
    async fn test_vanishes_during_check() {
        let store = MemoryStore::new();
        let (client, _events) = store.connect().await;
        client.create("/election", &[], CreateMode::Persistent).await.unwrap();
        client.create("/election/p_0000000002", &[], CreateMode::Ephemeral).await.unwrap();
        store.vanish_on_check("/election/p_0000000002").await;

        let watcher = PredecessorWatcher::new(Arc::new(client), "/election");
        let outcome = watcher
            .watch_for(&CandidateKey::new("p_0000000002"))
            .await
            .unwrap();
        assert_eq!(outcome, WatchOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_deleted_after_watch() {
        let store = MemoryStore::new();
        let (client, _events) = store.connect().await;
        client.create("/election", &[], CreateMode::Persistent).await.unwrap();
        client.create("/election/p_0000000001", &[], CreateMode::Ephemeral).await.unwrap();

        let watcher = PredecessorWatcher::new(Arc::new(client), "/election");
        let handle = tokio::spawn(async move {
            watcher.watch_for(&CandidateKey::new("p_0000000001")).await
        });

        while store.pending_watches().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.watched_paths().await, vec!["/election/p_0000000001"]);

        // A data change is not a removal
        store.set_data("/election/p_0000000001", b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        store.delete("/election/p_0000000001").await.unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), WatchOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_check_error_is_fatal() {
        let store = MemoryStore::new();
        let (client, _events) = store.connect().await;
        store.disconnect(client.session_id()).await;

        let watcher = PredecessorWatcher::new(Arc::new(client), "/election");
        let err = watcher
            .watch_for(&CandidateKey::new("p_0000000001"))
            .await
            .unwrap_err();
        assert_eq!(err.store_error(), Some(&StoreError::ConnectionLoss));
        assert!(err.is_fatal());
    }
}
