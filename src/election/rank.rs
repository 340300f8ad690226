//! Rank Resolution
//!
//! Orders the candidate nodes under the election root by their sequence
//! suffix and works out where this candidate stands. A waiting candidate
//! only ever watches the node immediately ahead of it, so a departing
//! node wakes exactly one successor instead of the whole queue.

use std::cmp::Ordering;
use std::sync::Arc;

use super::state::{sequence_suffix, CandidateKey};
use crate::error::{Error, Result};
use crate::store::CoordinationClient;

/// Position of this candidate in the current snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rank {
    /// Lowest sequence number: this candidate leads
    Leader,
    /// Wait for the immediately preceding candidate to go away
    WaitOn(CandidateKey),
}

/// Compare two candidate names by sequence suffix.
///
/// Suffixes are zero-padded, so a longer suffix is always the larger
/// number; equal lengths compare lexicographically.
fn by_sequence(a: &str, b: &str) -> Ordering {
    let (sa, sb) = (sequence_suffix(a), sequence_suffix(b));
    sa.len()
        .cmp(&sb.len())
        .then_with(|| sa.cmp(sb))
        .then_with(|| a.cmp(b))
}

/// Sort a candidate set snapshot ascending by sequence
pub fn sort_candidates(children: &mut [String]) {
    children.sort_by(|a, b| by_sequence(a, b));
}

/// Resolve the rank of `own` within an unsorted child listing of `root`
pub fn resolve_rank(root: &str, mut children: Vec<String>, own: &CandidateKey) -> Result<Rank> {
    if children.is_empty() {
        return Err(Error::EmptyCandidateSet {
            root: root.to_string(),
        });
    }

    sort_candidates(&mut children);

    let position = children
        .iter()
        .position(|c| c == own.as_str())
        .ok_or_else(|| Error::CandidateMissing {
            root: root.to_string(),
            key: own.to_string(),
        })?;

    if position == 0 {
        Ok(Rank::Leader)
    } else {
        Ok(Rank::WaitOn(CandidateKey::new(children[position - 1].clone())))
    }
}

/// Lists the candidate set and resolves this candidate's rank
pub struct RankResolver {
    client: Arc<dyn CoordinationClient>,
    root: String,
}

impl RankResolver {
    pub fn new(client: Arc<dyn CoordinationClient>, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    /// Take a fresh snapshot of the candidate set and rank `own` within it
    pub async fn evaluate(&self, own: &CandidateKey) -> Result<Rank> {
        let children = self
            .client
            .get_children(&self.root)
            .await
            .map_err(|e| Error::store("get_children", &self.root, e))?;

        tracing::debug!("children of {}: {:?}", self.root, children);

        resolve_rank(&self.root, children, own)
    }
}
