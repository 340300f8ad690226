//! Election State Machine
//!
//! Sole owner of this process's [`ElectionState`]. Every transition is
//! tagged with the session epoch it was computed in; a transition from an
//! abandoned epoch is refused and leaves the state untouched.
//!
//! ```text
//! UNREGISTERED --register--> evaluate --> LEADER | WAITING(k)
//! WAITING(k)   --predecessor gone--> evaluate --> LEADER | WAITING(k')
//! any          --session expired--> EXPIRED (terminal)
//! ```

use tokio::sync::{watch, Mutex};

use super::rank::Rank;
use super::state::{CandidateKey, ElectionState, SessionEpoch};
use crate::error::{Error, Result};

/// Invoked once, with our candidate key, when leadership is acquired
pub type LeaderCallback = Box<dyn FnOnce(&CandidateKey) + Send + 'static>;

struct Inner {
    state: ElectionState,
    epoch: SessionEpoch,
    key: Option<CandidateKey>,
    on_leader: Option<LeaderCallback>,
}

/// Drives the election state through its transitions
pub struct ElectionStateMachine {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ElectionState>,
}

impl Default for ElectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ElectionStateMachine {
    /// Create a state machine in UNREGISTERED at epoch 0
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ElectionState::Unregistered);
        Self {
            inner: Mutex::new(Inner {
                state: ElectionState::Unregistered,
                epoch: SessionEpoch::default(),
                key: None,
                on_leader: None,
            }),
            state_tx,
        }
    }

    /// Install the leadership callback (replaces any previous one)
    pub async fn set_leader_callback(&self, callback: LeaderCallback) {
        self.inner.lock().await.on_leader = Some(callback);
    }

    /// Get current state
    pub async fn state(&self) -> ElectionState {
        self.inner.lock().await.state.clone()
    }

    /// Get current session epoch
    pub async fn epoch(&self) -> SessionEpoch {
        self.inner.lock().await.epoch
    }

    /// Candidate key registered in the current epoch
    pub async fn candidate_key(&self) -> Option<CandidateKey> {
        self.inner.lock().await.key.clone()
    }

    pub async fn is_leader(&self) -> bool {
        self.inner.lock().await.state.is_leader()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state_tx.subscribe()
    }

    fn check_epoch(inner: &Inner, epoch: SessionEpoch) -> Result<()> {
        if inner.epoch != epoch {
            return Err(Error::StaleEpoch {
                seen: epoch.value(),
                current: inner.epoch.value(),
            });
        }
        Ok(())
    }

    /// Fail if `epoch` is no longer the current one
    pub async fn ensure_current(&self, epoch: SessionEpoch) -> Result<()> {
        Self::check_epoch(&*self.inner.lock().await, epoch)
    }

    fn set_state(&self, inner: &mut Inner, state: ElectionState) {
        tracing::info!("election state {} -> {}", inner.state, state);
        inner.state = state.clone();
        self.state_tx.send_replace(state);
    }

    /// Record the candidate key created in `epoch`
    pub async fn registered(&self, epoch: SessionEpoch, key: CandidateKey) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check_epoch(&inner, epoch)?;

        if inner.state != ElectionState::Unregistered {
            return Err(Error::InvalidTransition {
                from: inner.state.to_string(),
                to: "REGISTERED".into(),
            });
        }
        if let Some(existing) = &inner.key {
            return Err(Error::AlreadyRegistered {
                key: existing.to_string(),
                epoch: epoch.value(),
            });
        }

        inner.key = Some(key);
        Ok(())
    }

    /// Apply the result of a rank evaluation made in `epoch`
    pub async fn apply_rank(&self, epoch: SessionEpoch, rank: &Rank) -> Result<()> {
        let callback = {
            let mut inner = self.inner.lock().await;
            Self::check_epoch(&inner, epoch)?;

            let key = match (&inner.state, &inner.key) {
                (ElectionState::Unregistered, Some(key))
                | (ElectionState::Waiting { .. }, Some(key)) => key.clone(),
                (state, _) => {
                    return Err(Error::InvalidTransition {
                        from: state.to_string(),
                        to: match rank {
                            Rank::Leader => "LEADER".into(),
                            Rank::WaitOn(k) => format!("WAITING({})", k),
                        },
                    });
                }
            };

            match rank {
                Rank::Leader => {
                    self.set_state(&mut inner, ElectionState::Leader);
                    inner.on_leader.take().map(|cb| (cb, key))
                }
                Rank::WaitOn(predecessor) => {
                    self.set_state(
                        &mut inner,
                        ElectionState::Waiting {
                            predecessor: predecessor.clone(),
                        },
                    );
                    None
                }
            }
        };

        if let Some((callback, key)) = callback {
            callback(&key);
        }
        Ok(())
    }

    /// Enter EXPIRED and advance the epoch, invalidating all in-flight work.
    ///
    /// Returns the new epoch. Expiring twice is a no-op.
    pub async fn expire(&self) -> SessionEpoch {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
            return inner.epoch;
        }

        inner.epoch = inner.epoch.next();
        inner.key = None;
        inner.on_leader = None;
        self.set_state(&mut inner, ElectionState::Expired);
        inner.epoch
    }
}
