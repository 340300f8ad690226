//! In-Memory Coordination Store
//!
//! A single-process stand-in for a ZooKeeper-style ensemble. It keeps a
//! node tree with ephemeral ownership, per-parent sequence counters and
//! one-shot watches, and lets the caller drive session lifecycle
//! (disconnect, reconnect, expire) and inject faults. Used by the tests
//! and by the `simulate` command.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::{
    basename, parent_path, CoordinationClient, CreateMode, Exists, NodeWatch, SessionEvent,
    SessionEvents, WatchEvent,
};
use crate::error::StoreError;

/// Store-assigned session identifier
pub type SessionId = u64;

/// Width of the zero-padded suffix appended to sequential nodes
const SEQUENCE_WIDTH: usize = 10;

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
    children: Vec<String>,
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: Option<SessionId>) -> Self {
        Self {
            data,
            ephemeral_owner,
            children: Vec::new(),
            next_sequence: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connected,
    Disconnected,
    Expired,
}

struct Session {
    state: SessionState,
    events: mpsc::UnboundedSender<SessionEvent>,
}

struct Watch {
    session: SessionId,
    tx: oneshot::Sender<WatchEvent>,
}

/// Injected failures, consumed on first match
#[derive(Default)]
struct Faults {
    create: Vec<(String, StoreError)>,
    lost_create_reply: Vec<String>,
    list: Vec<StoreError>,
    vanish_on_check: Vec<String>,
}

struct Inner {
    nodes: HashMap<String, Node>,
    sessions: HashMap<SessionId, Session>,
    watches: HashMap<String, Vec<Watch>>,
    next_session: SessionId,
    faults: Faults,
}

impl Inner {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), None));
        Self {
            nodes,
            sessions: HashMap::new(),
            watches: HashMap::new(),
            next_session: 1,
            faults: Faults::default(),
        }
    }

    fn session_ready(&self, session: SessionId) -> Result<(), StoreError> {
        match self.sessions.get(&session).map(|s| s.state) {
            Some(SessionState::Connected) => Ok(()),
            Some(SessionState::Disconnected) => Err(StoreError::ConnectionLoss),
            Some(SessionState::Expired) | None => Err(StoreError::SessionExpired),
        }
    }

    fn emit(&self, session: SessionId, event: SessionEvent) {
        if let Some(s) = self.sessions.get(&session) {
            let _ = s.events.send(event);
        }
    }

    fn fire(&mut self, path: &str, event: WatchEvent) {
        if let Some(watches) = self.watches.remove(path) {
            for watch in watches {
                let _ = watch.tx.send(event);
            }
        }
    }

    fn create(
        &mut self,
        session: SessionId,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String, StoreError> {
        self.session_ready(session)?;

        if let Some(idx) = self.faults.create.iter().position(|(p, _)| p == path) {
            let (_, err) = self.faults.create.remove(idx);
            return Err(err);
        }

        let parent = parent_path(path).ok_or(StoreError::NodeExists)?;
        let full_path = {
            let parent_node = self.nodes.get_mut(parent).ok_or(StoreError::NoNode)?;
            if parent_node.ephemeral_owner.is_some() {
                return Err(StoreError::NoChildrenForEphemerals);
            }
            if mode.is_sequential() {
                let seq = parent_node.next_sequence;
                parent_node.next_sequence += 1;
                format!("{}{:0width$}", path, seq, width = SEQUENCE_WIDTH)
            } else {
                path.to_string()
            }
        };

        if self.nodes.contains_key(&full_path) {
            return Err(StoreError::NodeExists);
        }

        let owner = mode.is_ephemeral().then_some(session);
        self.nodes
            .insert(full_path.clone(), Node::new(data.to_vec(), owner));
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(basename(&full_path).to_string());
        }

        if let Some(idx) = self.faults.lost_create_reply.iter().position(|p| p == path) {
            self.faults.lost_create_reply.remove(idx);
            return Err(StoreError::ConnectionLoss);
        }

        Ok(full_path)
    }

    fn get_children(&mut self, session: SessionId, path: &str) -> Result<Vec<String>, StoreError> {
        self.session_ready(session)?;

        if !self.faults.list.is_empty() {
            return Err(self.faults.list.remove(0));
        }

        self.nodes
            .get(path)
            .map(|node| node.children.clone())
            .ok_or(StoreError::NoNode)
    }

    fn check_exists(&mut self, session: SessionId, path: &str) -> Result<Exists, StoreError> {
        self.session_ready(session)?;

        if let Some(idx) = self.faults.vanish_on_check.iter().position(|p| p == path) {
            self.faults.vanish_on_check.remove(idx);
            let _ = self.remove(path);
        }

        if !self.nodes.contains_key(path) {
            return Ok(Exists::Absent);
        }

        let (tx, rx) = oneshot::channel();
        self.watches
            .entry(path.to_string())
            .or_default()
            .push(Watch { session, tx });
        Ok(Exists::Present(NodeWatch::new(rx)))
    }

    fn remove(&mut self, path: &str) -> Result<(), StoreError> {
        let parent = parent_path(path).ok_or_else(|| StoreError::Other("cannot delete /".into()))?;
        match self.nodes.get(path) {
            None => return Err(StoreError::NoNode),
            Some(node) if !node.children.is_empty() => {
                return Err(StoreError::Other(format!("{} has children", path)));
            }
            Some(_) => {}
        }

        self.nodes.remove(path);
        let name = basename(path);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| c != name);
        }
        self.fire(path, WatchEvent::NodeDeleted);
        Ok(())
    }
}

/// Shared in-memory coordination store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store containing only `/`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Open a new session. `Connected` is already queued on the returned events.
    pub async fn connect(&self) -> (MemoryClient, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;

        let session = inner.next_session;
        inner.next_session += 1;
        let _ = tx.send(SessionEvent::Connected);
        inner.sessions.insert(
            session,
            Session {
                state: SessionState::Connected,
                events: tx,
            },
        );

        tracing::debug!("Opened session {}", session);
        (
            MemoryClient {
                store: self.clone(),
                session,
            },
            rx,
        )
    }

    /// Drop the connection while keeping the session alive
    pub async fn disconnect(&self, session: SessionId) {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.sessions.get_mut(&session) {
            if s.state == SessionState::Connected {
                s.state = SessionState::Disconnected;
                inner.emit(session, SessionEvent::Disconnected);
            }
        }
    }

    /// Restore the connection of a disconnected session
    pub async fn reconnect(&self, session: SessionId) {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.sessions.get_mut(&session) {
            if s.state == SessionState::Disconnected {
                s.state = SessionState::Connected;
                inner.emit(session, SessionEvent::Connected);
            }
        }
    }

    /// Expire a session: remove its ephemeral nodes and discard its watches
    pub async fn expire(&self, session: SessionId) {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&session) {
            Some(s) if s.state != SessionState::Expired => s.state = SessionState::Expired,
            _ => return,
        }
        inner.emit(session, SessionEvent::Expired);

        let owned: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            let _ = inner.remove(&path);
        }

        for watches in inner.watches.values_mut() {
            watches.retain(|w| w.session != session);
        }
        inner.watches.retain(|_, w| !w.is_empty());

        tracing::debug!("Expired session {}", session);
    }

    /// Delete a node, firing its watches
    pub async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.inner.lock().await.remove(path)
    }

    /// Replace a node's data, firing its watches
    pub async fn set_data(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let node = inner.nodes.get_mut(path).ok_or(StoreError::NoNode)?;
        node.data = data.to_vec();
        inner.fire(path, WatchEvent::NodeDataChanged);
        Ok(())
    }

    /// Names of a node's children, in creation order
    pub async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .nodes
            .get(path)
            .map(|node| node.children.clone())
            .ok_or(StoreError::NoNode)
    }

    /// Data stored at a node
    pub async fn data(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        inner.nodes.get(path).map(|node| node.data.clone())
    }

    /// Check whether a node exists without arming a watch
    pub async fn exists(&self, path: &str) -> bool {
        self.inner.lock().await.nodes.contains_key(path)
    }

    /// Session owning an ephemeral node
    pub async fn ephemeral_owner(&self, path: &str) -> Option<SessionId> {
        let inner = self.inner.lock().await;
        inner.nodes.get(path).and_then(|node| node.ephemeral_owner)
    }

    /// Number of armed watches that still have a listener
    pub async fn pending_watches(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .watches
            .values()
            .flatten()
            .filter(|w| !w.tx.is_closed())
            .count()
    }

    /// Paths with at least one armed watch that still has a listener
    pub async fn watched_paths(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut paths: Vec<String> = inner
            .watches
            .iter()
            .filter(|(_, watches)| watches.iter().any(|w| !w.tx.is_closed()))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Fail the next create request for exactly `path`
    pub async fn fail_create(&self, path: &str, err: StoreError) {
        let mut inner = self.inner.lock().await;
        inner.faults.create.push((path.to_string(), err));
    }

    /// Apply the next create for `path` but report `ConnectionLoss` to the caller
    pub async fn lose_create_reply(&self, path: &str) {
        let mut inner = self.inner.lock().await;
        inner.faults.lost_create_reply.push(path.to_string());
    }

    /// Fail the next child listing
    pub async fn fail_next_list(&self, err: StoreError) {
        self.inner.lock().await.faults.list.push(err);
    }

    /// Delete `path` while the next existence check on it is in flight
    pub async fn vanish_on_check(&self, path: &str) {
        let mut inner = self.inner.lock().await;
        inner.faults.vanish_on_check.push(path.to_string());
    }
}

/// Client bound to one session of a [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryClient {
    store: MemoryStore,
    session: SessionId,
}

impl MemoryClient {
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String, StoreError> {
        let mut inner = self.store.inner.lock().await;
        inner.create(self.session, path, data, mode)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let mut inner = self.store.inner.lock().await;
        inner.get_children(self.session, path)
    }

    async fn check_exists(&self, path: &str) -> Result<Exists, StoreError> {
        let mut inner = self.store.inner.lock().await;
        inner.check_exists(self.session, path)
    }
}
