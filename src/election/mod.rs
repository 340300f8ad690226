//! Leader Election
//!
//! Candidates register an ephemeral, sequential node under a shared root.
//! The lowest sequence number leads; everyone else watches only the node
//! immediately ahead of them and re-evaluates when it disappears.

mod machine;
mod rank;
mod registrar;
mod session;
mod state;
mod watcher;

use std::sync::Arc;

pub use machine::{ElectionStateMachine, LeaderCallback};
pub use rank::{resolve_rank, sort_candidates, Rank, RankResolver};
pub use registrar::CandidateRegistrar;
pub use session::{ElectionOutcome, SessionLifecycleHandler, EXIT_SESSION_EXPIRED};
pub use state::{CandidateKey, ElectionState, SessionEpoch};
pub use watcher::{PredecessorWatcher, WatchOutcome};

use crate::config::{ElectionConfig, WolfElectConfig};
use crate::error::Result;
use crate::store::{CoordinationClient, SessionEvents};

/// A process taking part in the election
pub struct Candidate {
    identity: String,
    machine: Arc<ElectionStateMachine>,
    handler: SessionLifecycleHandler,
    on_leader: Option<LeaderCallback>,
}

impl Candidate {
    /// Create a candidate from the full configuration
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        events: SessionEvents,
        config: &WolfElectConfig,
    ) -> Self {
        Self::with_identity(client, events, &config.election, config.node_id())
    }

    /// Create a candidate with an explicit process identity
    pub fn with_identity(
        client: Arc<dyn CoordinationClient>,
        events: SessionEvents,
        election: &ElectionConfig,
        identity: impl Into<String>,
    ) -> Self {
        let identity = identity.into();
        let machine = Arc::new(ElectionStateMachine::new());
        let registrar = Arc::new(CandidateRegistrar::new(
            client.clone(),
            election.root.clone(),
            election.prefix.clone(),
            identity.as_bytes(),
        ));
        let resolver = Arc::new(RankResolver::new(client.clone(), election.root.clone()));
        let watcher = Arc::new(PredecessorWatcher::new(client, election.root.clone()));

        let handler = SessionLifecycleHandler::new(
            machine.clone(),
            registrar,
            resolver,
            watcher,
            events,
            identity.clone(),
        );

        Self {
            identity,
            machine,
            handler,
            on_leader: None,
        }
    }

    /// Run `callback` once if this candidate becomes leader
    pub fn on_leader<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&CandidateKey) + Send + 'static,
    {
        self.on_leader = Some(Box::new(callback));
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Read access to the election state while the candidate runs
    pub fn state_machine(&self) -> Arc<ElectionStateMachine> {
        self.machine.clone()
    }

    /// Take part until the session expires or a fatal error occurs
    pub async fn run(self) -> Result<ElectionOutcome> {
        if let Some(callback) = self.on_leader {
            self.machine.set_leader_callback(callback).await;
        }
        self.handler.run().await
    }
}
