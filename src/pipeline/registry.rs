//! Claim registry — which conversations already belong to a category.
//!
//! Owned exclusively by the pipeline driver. Stages receive an immutable
//! unclaimed snapshot and hand their claims back; only the driver calls
//! `claim`, and only between stages.

use std::collections::HashSet;

use tracing::debug;

use crate::mail::types::Conversation;

/// Set of claimed conversation IDs. Grows monotonically during a run; never
/// shrinks, never holds duplicates.
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    claimed: HashSet<String>,
}

/// Outcome of one claim call: how many IDs were new, and how many were
/// dropped as duplicates or unknown. Dropped IDs are an oracle-quality
/// signal, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub accepted: usize,
    pub dropped: usize,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter a pool down to conversations not yet claimed.
    pub fn unclaimed<'a>(&self, pool: &'a [Conversation]) -> Vec<&'a Conversation> {
        pool.iter().filter(|c| !self.claimed.contains(&c.id)).collect()
    }

    /// Has this ID been claimed?
    pub fn is_claimed(&self, id: &str) -> bool {
        self.claimed.contains(id)
    }

    /// Number of claimed IDs.
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Claim IDs for a stage. Already-claimed IDs are idempotent no-ops;
    /// both duplicates and IDs outside `pool_ids` are counted as dropped
    /// (the oracle's output is advisory, not authoritative).
    pub fn claim<'a>(
        &mut self,
        stage: &str,
        ids: impl IntoIterator<Item = &'a str>,
        pool_ids: &HashSet<&str>,
    ) -> ClaimOutcome {
        let mut accepted = 0usize;
        let mut dropped = 0usize;
        for id in ids {
            if !pool_ids.contains(id) || !self.claimed.insert(id.to_string()) {
                dropped += 1;
            } else {
                accepted += 1;
            }
        }
        if dropped > 0 {
            debug!(stage, dropped, "Dropped dangling or duplicate oracle IDs");
        }
        ClaimOutcome { accepted, dropped }
    }
}
