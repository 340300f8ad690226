//! WolfElect - Leader Election over a Coordination Store
//!
//! A group of cooperating processes agrees on exactly one leader at a time
//! using a ZooKeeper-style coordination store as the only shared state.
//!
//! # Protocol
//!
//! Each candidate creates one ephemeral, sequential node under a shared
//! election root. The candidate holding the lowest sequence number is the
//! leader. Every other candidate watches only the node immediately ahead
//! of it, so a departure wakes exactly one successor.
//!
//! # Sessions
//!
//! Candidate nodes live as long as the store session that created them.
//! Reconnecting within a live session keeps the existing node; session
//! expiry ends participation and the host exits with
//! [`election::EXIT_SESSION_EXPIRED`] so a supervisor can restart it with
//! a fresh identity.

pub mod config;
pub mod error;
pub mod election;
pub mod store;

pub use config::WolfElectConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfElectConfig;
    pub use crate::election::{Candidate, CandidateKey, ElectionOutcome, ElectionState};
    pub use crate::error::{Error, Result, StoreError};
    pub use crate::store::{CoordinationClient, MemoryStore, SessionEvent};
}
