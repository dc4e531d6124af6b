//! Digest assembly — the final aggregated report structure.
//!
//! Pure transformation of claims + enrichment + action items; no I/O, no
//! oracle calls. The serialized shape is the contract with the downstream
//! report/notification collaborators, and `selection`/`claimed_by_account`
//! feed the archive-confirmation step.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mail::types::Conversation;
use crate::pipeline::Claimed;
use crate::pipeline::actions::ActionItem;
use crate::pipeline::category::Category;
use crate::pipeline::enrich::{Enrichment, EnrichmentOutput};

/// One claimed conversation as it appears in the digest.
#[derive(Debug, Clone, Serialize)]
pub struct DigestItem {
    pub conversation: Conversation,
    /// One-line triage summary from the categorizer, when it produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Category-specific structured facts, when the category enriches
    /// per item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

/// All claimed conversations for one category.
#[derive(Debug, Clone, Serialize)]
pub struct DigestSection {
    pub count: usize,
    /// Aggregate narrative for rolled-up categories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub conversations: Vec<DigestItem>,
}

/// The final triage digest.
///
/// Sections iterate in pipeline priority order (`Category`'s declaration
/// order). A conversation no stage claimed appears nowhere in here.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub sections: BTreeMap<Category, DigestSection>,
    pub action_items: BTreeMap<String, Vec<ActionItem>>,
}

impl Digest {
    /// Assemble the digest. Categories without claims are omitted.
    pub fn assemble(
        claims: BTreeMap<Category, Vec<Claimed>>,
        mut enrichment: EnrichmentOutput,
        action_items: HashMap<String, Vec<ActionItem>>,
    ) -> Self {
        let mut sections = BTreeMap::new();
        for (category, claimed) in claims {
            if claimed.is_empty() {
                continue;
            }
            let conversations: Vec<DigestItem> = claimed
                .into_iter()
                .map(|c| {
                    let record = enrichment.records.remove(&c.conversation.id);
                    DigestItem {
                        conversation: c.conversation,
                        summary: c.summary,
                        enrichment: record,
                    }
                })
                .collect();
            sections.insert(
                category,
                DigestSection {
                    count: conversations.len(),
                    summary: enrichment.summaries.remove(&category),
                    conversations,
                },
            );
        }

        Self {
            generated_at: Utc::now(),
            sections,
            action_items: action_items.into_iter().collect(),
        }
    }

    /// Total conversations claimed across all categories.
    pub fn total_claimed(&self) -> usize {
        self.sections.values().map(|s| s.count).sum()
    }

    /// Total action items across all conversations.
    pub fn total_action_items(&self) -> usize {
        self.action_items.values().map(Vec::len).sum()
    }

    /// Flattened claimed-ID list, in section order: "select all" semantics
    /// for the downstream report.
    pub fn selection(&self) -> Vec<String> {
        self.sections
            .values()
            .flat_map(|s| s.conversations.iter().map(|c| c.conversation.id.clone()))
            .collect()
    }

    /// Claimed conversation IDs grouped by originating account, for the
    /// archive/confirm collaborator.
    pub fn claimed_by_account(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_account: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for section in self.sections.values() {
            for item in &section.conversations {
                by_account
                    .entry(item.conversation.account.clone())
                    .or_default()
                    .push(item.conversation.id.clone());
            }
        }
        by_account
    }
}
