//! Session Lifecycle Handling
//!
//! One task per candidate multiplexes the store's lifecycle signals with
//! the campaign (register, evaluate, watch, re-evaluate). Expiry drops the
//! in-flight campaign and advances the epoch, so nothing from the dead
//! session can touch the state afterwards.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::Instrument;

use super::machine::ElectionStateMachine;
use super::rank::{Rank, RankResolver};
use super::registrar::CandidateRegistrar;
use super::state::{CandidateKey, SessionEpoch};
use super::watcher::PredecessorWatcher;
use crate::error::{Error, Result, StoreError};
use crate::store::{SessionEvent, SessionEvents};

/// Process exit status telling a supervisor to restart with a fresh session
pub const EXIT_SESSION_EXPIRED: i32 = 13;

/// How participation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// The store session expired; this process must not participate again
    Expired {
        /// Candidate key held when the session ended
        key: Option<CandidateKey>,
        /// Whether leadership was held when the session ended
        was_leader: bool,
    },
}

impl ElectionOutcome {
    /// Exit status the hosting process should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            ElectionOutcome::Expired { .. } => EXIT_SESSION_EXPIRED,
        }
    }
}

/// Register, then evaluate and watch until leadership is reached
async fn campaign(
    machine: Arc<ElectionStateMachine>,
    registrar: Arc<CandidateRegistrar>,
    resolver: Arc<RankResolver>,
    watcher: Arc<PredecessorWatcher>,
    epoch: SessionEpoch,
) -> Result<()> {
    let key = registrar.register(epoch).await?;
    machine.registered(epoch, key.clone()).await?;

    loop {
        let rank = resolver.evaluate(&key).await?;
        machine.apply_rank(epoch, &rank).await?;

        let predecessor = match rank {
            Rank::Leader => return Ok(()),
            Rank::WaitOn(predecessor) => predecessor,
        };

        let outcome = watcher.watch_for(&predecessor).await?;
        machine.ensure_current(epoch).await?;
        tracing::debug!("predecessor {} {:?}, re-evaluating", predecessor, outcome);
    }
}

/// Reacts to connect, disconnect and expire signals for one candidate
pub struct SessionLifecycleHandler {
    machine: Arc<ElectionStateMachine>,
    registrar: Arc<CandidateRegistrar>,
    resolver: Arc<RankResolver>,
    watcher: Arc<PredecessorWatcher>,
    events: SessionEvents,
    /// Process identity, for logs
    identity: String,
}

impl SessionLifecycleHandler {
    pub fn new(
        machine: Arc<ElectionStateMachine>,
        registrar: Arc<CandidateRegistrar>,
        resolver: Arc<RankResolver>,
        watcher: Arc<PredecessorWatcher>,
        events: SessionEvents,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            machine,
            registrar,
            resolver,
            watcher,
            events,
            identity: identity.into(),
        }
    }

    /// Run until the session expires or a fatal error occurs
    pub async fn run(self) -> Result<ElectionOutcome> {
        let span = tracing::info_span!("candidate", id = %self.identity);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Result<ElectionOutcome> {
        let mut campaign: Option<BoxFuture<'static, Result<()>>> = None;

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Some(SessionEvent::Connected) => {
                        if let Some(started) = self.on_connected(campaign.is_some()).await {
                            campaign = Some(started);
                        }
                    }
                    Some(SessionEvent::Disconnected) => {
                        tracing::warn!("disconnected from store - do not panic, waiting for reconnect");
                    }
                    Some(SessionEvent::Expired) => {
                        return Ok(self.on_expired().await);
                    }
                    None => return Err(Error::SessionEventsClosed),
                },

                result = async {
                    match campaign.as_mut() {
                        Some(running) => running.await,
                        None => std::future::pending().await,
                    }
                }, if campaign.is_some() => {
                    campaign = None;
                    match result {
                        Ok(()) => tracing::info!("I AM THE LEADER"),
                        Err(Error::StaleEpoch { seen, current }) => {
                            tracing::debug!("dropping campaign from epoch {} (now {})", seen, current);
                        }
                        Err(e) if e.store_error() == Some(&StoreError::SessionExpired) => {
                            tracing::warn!("store reports session expired: {}", e);
                            return Ok(self.on_expired().await);
                        }
                        Err(e) => {
                            tracing::error!("election failed: {}", e);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Start a campaign unless this epoch already has one (or finished one)
    async fn on_connected(&self, in_flight: bool) -> Option<BoxFuture<'static, Result<()>>> {
        let epoch = self.machine.epoch().await;

        if in_flight {
            tracing::info!("reconnected, campaign for epoch {} still running", epoch);
            return None;
        }
        if let Some(key) = self.registrar.registered_key(epoch).await {
            tracing::info!("reconnected within live session, keeping candidate {}", key);
            return None;
        }
        if self.machine.state().await.is_terminal() {
            return None;
        }

        tracing::info!("connected to store, registering for epoch {}", epoch);
        Some(Box::pin(campaign(
            self.machine.clone(),
            self.registrar.clone(),
            self.resolver.clone(),
            self.watcher.clone(),
            epoch,
        )))
    }

    async fn on_expired(&self) -> ElectionOutcome {
        let key = self.machine.candidate_key().await;
        let was_leader = self.machine.is_leader().await;
        let epoch = self.machine.expire().await;

        tracing::error!("session expired - bail out (now epoch {})", epoch);
        ElectionOutcome::Expired { key, was_leader }
    }
}
