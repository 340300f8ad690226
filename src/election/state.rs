//! Election state and identifiers

use serde::{Deserialize, Serialize};

/// Local counter distinguishing successive store sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SessionEpoch(u64);

impl SessionEpoch {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The epoch that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SessionEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a candidate node under the election root (e.g. `p_0000000007`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateKey(String);

impl CandidateKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing decimal digits assigned by the store
    pub fn sequence_suffix(&self) -> &str {
        sequence_suffix(&self.0)
    }
}

impl std::fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trailing run of ASCII digits in a node name
pub(crate) fn sequence_suffix(name: &str) -> &str {
    let start = name
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);
    &name[start..]
}

/// Election state of this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ElectionState {
    /// No candidate node evaluated yet in this session
    Unregistered,
    /// Waiting for the immediate predecessor to go away
    Waiting { predecessor: CandidateKey },
    /// This process holds leadership
    Leader,
    /// Session is gone; terminal
    Expired,
}

impl ElectionState {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionState::Leader)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ElectionState::Expired)
    }
}

impl std::fmt::Display for ElectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionState::Unregistered => write!(f, "UNREGISTERED"),
            ElectionState::Waiting { predecessor } => write!(f, "WAITING({})", predecessor),
            ElectionState::Leader => write!(f, "LEADER"),
            ElectionState::Expired => write!(f, "EXPIRED"),
        }
    }
}
