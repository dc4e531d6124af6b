//! The triage pipeline.
//!
//! Flow, one invocation per run:
//!
//! 1. Categorizer stages in fixed priority order consume the unclaimed pool
//!    and produce disjoint claimed sets (claim registry enforces the
//!    partition)
//! 2. Enricher stages extract category-specific facts from claimed items
//! 3. The action-item extractor runs once over every claimed conversation
//! 4. The digest aggregator assembles the final report structure
//!
//! Stages are strictly sequential; parallelism exists only inside a stage's
//! batched oracle calls and across independent enrichers.

pub mod actions;
pub mod categorize;
pub mod category;
pub mod digest;
pub mod driver;
pub mod enrich;
pub mod registry;

use crate::mail::types::Conversation;

/// A conversation after a categorizer stage claimed it.
#[derive(Debug, Clone)]
pub struct Claimed {
    pub conversation: Conversation,
    /// One-line summary from the claiming stage, when its style produces one.
    pub summary: Option<String>,
}

pub use driver::{ClassifyMode, TriagePipeline};
