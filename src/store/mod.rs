//! Coordination Store Interface
//!
//! The election only talks to the store through [`CoordinationClient`]:
//! node creation, child listing and existence checks that arm a one-shot
//! watch. Session lifecycle signals arrive on a separate channel handed
//! out when the session is opened.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::StoreError;

mod memory;

pub use memory::{MemoryClient, MemoryStore, SessionId};

/// How a node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    /// Node is removed when the owning session ends
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Store appends a sequence suffix to the requested name
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Session lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connected (or reconnected) to the ensemble
    Connected,
    /// Connection dropped; the session may still be alive
    Disconnected,
    /// Session is gone along with every ephemeral node it owned
    Expired,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connected => write!(f, "CONNECTED"),
            SessionEvent::Disconnected => write!(f, "DISCONNECTED"),
            SessionEvent::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Receiving half of a session's lifecycle signals
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Event delivered by a node watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    NodeDeleted,
    NodeDataChanged,
    /// The watch was discarded without firing (session closed)
    Dropped,
}

/// One-shot watch armed by an existence check
#[derive(Debug)]
pub struct NodeWatch {
    rx: oneshot::Receiver<WatchEvent>,
}

impl NodeWatch {
    pub fn new(rx: oneshot::Receiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the watch to fire
    pub async fn fired(self) -> WatchEvent {
        self.rx.await.unwrap_or(WatchEvent::Dropped)
    }
}

/// Result of an existence check
#[derive(Debug)]
pub enum Exists {
    /// Node is absent now; no watch was armed
    Absent,
    /// Node is present; the watch observes any later change
    Present(NodeWatch),
}

/// Operations the election consumes from the coordination store
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Create a node, returning the full path actually created
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String, StoreError>;

    /// List the names of a node's children, in no particular order
    async fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Check whether a node exists, arming a watch if it does.
    ///
    /// The check and the watch are atomic: a deletion after the check is
    /// always delivered to the watch.
    async fn check_exists(&self, path: &str) -> Result<Exists, StoreError>;
}

/// Join a parent path and a child name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Final component of a path
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent of a path (`None` for the store root)
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}
