//! WolfElect Error Types

use thiserror::Error;

/// Result type alias for WolfElect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the coordination store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("node already exists")]
    NodeExists,

    #[error("node does not exist")]
    NoNode,

    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,

    #[error("connection lost")]
    ConnectionLoss,

    #[error("session expired")]
    SessionExpired,

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Short code used in logs
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NodeExists => "NODE_EXISTS",
            StoreError::NoNode => "NO_NODE",
            StoreError::NoChildrenForEphemerals => "NO_CHILDREN_FOR_EPHEMERALS",
            StoreError::ConnectionLoss => "CONNECTION_LOSS",
            StoreError::SessionExpired => "SESSION_EXPIRED",
            StoreError::Other(_) => "OTHER",
        }
    }
}

/// WolfElect error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Store errors
    #[error("Store {op} failed on {path}: {source}")]
    Store {
        op: &'static str,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    // Consistency violations
    #[error("No children found under {root} - the store lost our candidate node")]
    EmptyCandidateSet { root: String },

    #[error("Candidate {key} missing from the children of {root}")]
    CandidateMissing { root: String, key: String },

    // Protocol violations
    #[error("Candidate already registered as {key} in session epoch {epoch}")]
    AlreadyRegistered { key: String, epoch: u64 },

    #[error("Invalid election transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Stale session epoch {seen} (current {current})")]
    StaleEpoch { seen: u64, current: u64 },

    #[error("Session event stream closed")]
    SessionEventsClosed,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a store error with the operation and path it came from
    pub fn store(op: &'static str, path: impl Into<String>, source: StoreError) -> Self {
        Error::Store {
            op,
            path: path.into(),
            source,
        }
    }

    /// Check if this error means the store's view can no longer be trusted
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Error::EmptyCandidateSet { .. } | Error::CandidateMissing { .. }
        )
    }

    /// Check if this error must end participation for the current session.
    ///
    /// Stale-epoch refusals are the only protocol errors that are not fatal:
    /// they belong to a session that has already been abandoned.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::StaleEpoch { .. })
    }

    /// The underlying store error, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Error::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}
