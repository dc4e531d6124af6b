//! Cross-cutting action-item extraction.
//!
//! Runs once, after categorization and enrichment, over the union of every
//! claimed conversation regardless of category: an Amazon shipping delay
//! and a school permission slip can both carry an action item. The prompt
//! encodes a strict test so purely informational mail never qualifies, and
//! every item must cite an exact quote from the source text: downstream
//! consumers should not trust a description without the quote.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OracleError, PipelineError};
use crate::oracle::retry::{RetryPolicy, call_with_retry};
use crate::oracle::{Oracle, decode};
use crate::pipeline::Claimed;

/// One action item, attached to a conversation by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    /// What needs doing.
    pub description: String,
    /// Verbatim text from the email justifying the item.
    pub exact_quote: String,
    /// Surrounding context for the reader.
    #[serde(default)]
    pub context: String,
    /// Link to act on; empty string when none exists.
    #[serde(default)]
    pub link: String,
    /// Ordered steps to complete the item; empty when the link suffices.
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ActionRow {
    conversation_id: String,
    #[serde(flatten)]
    item: ActionItem,
}

/// Extract action items over all claimed conversations.
///
/// Returns a map from conversation ID to its items. Conversations without
/// items are simply absent. IDs the oracle invents, and items missing their
/// justifying quote, are dropped.
pub async fn extract_action_items(
    oracle: &dyn Oracle,
    retry: RetryPolicy,
    claimed: &[&Claimed],
) -> Result<HashMap<String, Vec<ActionItem>>, PipelineError> {
    if claimed.is_empty() {
        return Ok(HashMap::new());
    }

    let system = action_system_prompt();
    let prompt = action_user_prompt(claimed);
    let raw = call_with_retry(retry, || oracle.classify(&system, &prompt))
        .await
        .map_err(PipelineError::Actions)?;

    let rows: Vec<ActionRow> = decode(&raw).map_err(PipelineError::Actions)?;
    let known_ids: HashSet<&str> = claimed.iter().map(|c| c.conversation.id.as_str()).collect();

    let mut items: HashMap<String, Vec<ActionItem>> = HashMap::new();
    for row in rows {
        if !known_ids.contains(row.conversation_id.as_str()) {
            debug!(id = %row.conversation_id, "Dropped action item for unknown ID");
            continue;
        }
        if row.item.exact_quote.trim().is_empty() {
            debug!(id = %row.conversation_id, "Dropped action item without exact quote");
            continue;
        }
        items.entry(row.conversation_id).or_default().push(row.item);
    }

    info!(
        conversations = items.len(),
        total = items.values().map(Vec::len).sum::<usize>(),
        "Action-item extraction complete"
    );
    Ok(items)
}

fn action_system_prompt() -> String {
    "You are extracting action items from emails. An action item exists ONLY if:\n\
     (a) a deadline or opportunity will be missed without action, or\n\
     (b) a specific person is waiting on a response, or\n\
     (c) a concrete negative consequence follows from inaction.\n\
     Purely informational content does NOT qualify. Most emails have no \
     action items.\n\n\
     Respond with ONLY a JSON array, one object per action item (empty array \
     when none):\n\
     [{\"conversation_id\": \"...\", \"description\": \"...\", \
     \"exact_quote\": \"...\", \"context\": \"...\", \"link\": \"\", \
     \"steps\": []}]\n\n\
     Rules:\n\
     - \"exact_quote\" must be copied verbatim from the email text; an item \
       without a quote is invalid\n\
     - \"link\" is the URL to act on, or an empty string\n\
     - \"steps\" lists what to do in order; leave it empty when the link \
       suffices"
        .to_string()
}

fn action_user_prompt(claimed: &[&Claimed]) -> String {
    let mut prompt = String::with_capacity(claimed.len() * 256);
    prompt.push_str("Conversations:\n\n");
    for c in claimed {
        prompt.push_str(&c.conversation.prompt_block());
        prompt.push('\n');
    }
    prompt
}
