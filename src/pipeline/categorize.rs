//! Categorizer stages — oracle calls that claim conversations.
//!
//! Two interpretation styles, both supported by the driver:
//!
//! - **Pooled**: one oracle call per category stage covering the entire
//!   unclaimed pool, returning a yes/no decision per conversation. Stages run
//!   in priority order, each over the shrinking unclaimed remainder.
//! - **Per-conversation**: one oracle call per conversation (batched),
//!   returning exactly one label from the closed category set, with an
//!   explicit `skip` for personal correspondence that must never reach the
//!   digest.
//!
//! Stages only interpret oracle output; claiming is the driver's job.

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::OracleError;
use crate::mail::types::Conversation;
use crate::oracle::batch::Batcher;
use crate::oracle::retry::{RetryPolicy, call_with_retry};
use crate::oracle::{Oracle, decode};
use crate::pipeline::category::{Assignment, Category};

// ── Pooled style ────────────────────────────────────────────────────

/// One per-conversation verdict from a pooled stage call.
#[derive(Debug, Clone, Deserialize)]
pub struct PooledDecision {
    pub conversation_id: String,
    #[serde(default)]
    pub matches: bool,
    #[serde(default)]
    pub summary: String,
}

/// Run one pooled category stage over the unclaimed pool.
///
/// Zero unclaimed input returns empty without calling the oracle. The
/// returned decisions are already filtered to positive matches with a
/// non-empty summary; intersecting with the pool and claiming is left to
/// the driver.
pub async fn run_pooled_stage(
    oracle: &dyn Oracle,
    retry: RetryPolicy,
    category: Category,
    unclaimed: &[&Conversation],
) -> Result<Vec<PooledDecision>, OracleError> {
    if unclaimed.is_empty() {
        debug!(stage = category.label(), "Empty unclaimed pool, skipping oracle call");
        return Ok(Vec::new());
    }

    let system = pooled_system_prompt(category);
    let prompt = pooled_user_prompt(unclaimed);

    let raw = call_with_retry(retry, || oracle.classify(&system, &prompt)).await?;
    let decisions: Vec<PooledDecision> = decode(&raw)?;

    let positive: Vec<PooledDecision> = decisions
        .into_iter()
        .filter(|d| d.matches && !d.summary.trim().is_empty())
        .collect();

    info!(
        stage = category.label(),
        offered = unclaimed.len(),
        matched = positive.len(),
        "Pooled stage complete"
    );
    Ok(positive)
}

fn pooled_system_prompt(category: Category) -> String {
    format!(
        "You are an email triage engine. You will be shown a list of email \
         conversations. Decide for each whether it is {criterion}.\n\n\
         Respond with ONLY a JSON array, one object per conversation:\n\
         [{{\"conversation_id\": \"...\", \"matches\": true, \"summary\": \"...\"}}]\n\n\
         Rules:\n\
         - Include every conversation you were shown, matching or not\n\
         - \"summary\" is one short sentence describing the email; required \
           when \"matches\" is true\n\
         - When unsure, answer \"matches\": false",
        criterion = category.criterion()
    )
}

fn pooled_user_prompt(unclaimed: &[&Conversation]) -> String {
    let mut prompt = String::with_capacity(unclaimed.len() * 256);
    prompt.push_str("Conversations:\n\n");
    for conversation in unclaimed {
        prompt.push_str(&conversation.prompt_block());
        prompt.push('\n');
    }
    prompt
}

// ── Per-conversation style ──────────────────────────────────────────

/// Oracle answer for a single conversation.
#[derive(Debug, Deserialize)]
struct AssignmentAnswer {
    category: String,
}

/// Classify every unclaimed conversation individually, batched.
///
/// Returns `(conversation_id, assignment)` pairs in pool order. A label
/// outside the closed set is treated as `skip`; oracle output is advisory,
/// and an unknown label must not invent a category.
pub async fn classify_each(
    oracle: &dyn Oracle,
    retry: RetryPolicy,
    batcher: &Batcher,
    unclaimed: &[&Conversation],
) -> Result<Vec<(String, Assignment)>, OracleError> {
    if unclaimed.is_empty() {
        debug!("Empty unclaimed pool, skipping classification");
        return Ok(Vec::new());
    }

    let system = single_system_prompt();
    let items: Vec<(String, String)> = unclaimed
        .iter()
        .map(|c| (c.id.clone(), c.prompt_block()))
        .collect();

    let system_ref = &system;
    let results = batcher
        .run(items, |(id, block)| async move {
            let user = format!("Classify this email:\n\n{block}");
            let raw = call_with_retry(retry, || oracle.classify(system_ref, &user)).await?;
            let answer: AssignmentAnswer = decode(&raw)?;
            let assignment = Assignment::from_label(&answer.category).unwrap_or_else(|| {
                debug!(id = %id, label = %answer.category, "Unknown category label, skipping");
                Assignment::Skip
            });
            Ok((id, assignment))
        })
        .await?;

    info!(classified = results.len(), "Per-conversation classification complete");
    Ok(results)
}

fn single_system_prompt() -> String {
    let mut prompt = String::from(
        "You are an email triage engine. Assign the email exactly one of the \
         following categories:\n\n",
    );
    for category in Category::PRIORITY {
        prompt.push_str(&format!("- \"{}\": {}\n", category.label(), category.criterion()));
    }
    prompt.push_str(
        "- \"skip\": genuine personal correspondence from a real person; \
         must not be filed anywhere\n\n\
         Respond with ONLY a JSON object: {\"category\": \"...\"}. \
         Do not provide explanations or multiple categories.",
    );
    prompt
}
