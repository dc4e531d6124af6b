//! Pipeline driver — sequences stages and owns the claim registry.
//!
//! The registry is created fresh per run and mutated only here, between
//! stages; stages receive an immutable snapshot of their unclaimed pool.
//! A fatal stage failure aborts the whole run and surfaces the original
//! error; no partial digest is produced.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use crate::error::{Error, PipelineError};
use crate::mail::types::Conversation;
use crate::oracle::Oracle;
use crate::oracle::batch::Batcher;
use crate::oracle::retry::RetryPolicy;
use crate::pipeline::Claimed;
use crate::pipeline::actions::extract_action_items;
use crate::pipeline::categorize::{classify_each, run_pooled_stage};
use crate::pipeline::category::{Assignment, Category};
use crate::pipeline::digest::Digest;
use crate::pipeline::enrich::enrich_claims;
use crate::pipeline::registry::ClaimRegistry;

/// How categorization calls the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyMode {
    /// One oracle call per category stage, covering the whole unclaimed pool.
    Pooled,
    /// One oracle call per conversation, one combined stage, batched.
    PerConversation,
}

/// The triage pipeline.
pub struct TriagePipeline {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
    batcher: Batcher,
    mode: ClassifyMode,
}

impl TriagePipeline {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            retry: RetryPolicy::default(),
            batcher: Batcher::default(),
            mode: ClassifyMode::Pooled,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batcher(mut self, batcher: Batcher) -> Self {
        self.batcher = batcher;
        self
    }

    pub fn with_mode(mut self, mode: ClassifyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run the full pipeline over a conversation pool.
    ///
    /// An empty pool completes with an empty digest and zero oracle calls.
    pub async fn run(&self, pool: Vec<Conversation>) -> Result<Digest, Error> {
        info!(pool = pool.len(), mode = ?self.mode, "Starting triage run");

        let mut registry = ClaimRegistry::new();
        let claims = match self.mode {
            ClassifyMode::Pooled => self.categorize_pooled(&pool, &mut registry).await?,
            ClassifyMode::PerConversation => {
                self.categorize_each(&pool, &mut registry).await?
            }
        };

        info!(
            claimed = registry.len(),
            unclaimed = pool.len() - registry.len(),
            "Categorization complete"
        );

        let enrichment = enrich_claims(self.oracle.as_ref(), self.retry, &claims).await?;

        let all_claimed: Vec<&Claimed> = claims.values().flatten().collect();
        let action_items =
            extract_action_items(self.oracle.as_ref(), self.retry, &all_claimed).await?;

        let digest = Digest::assemble(claims, enrichment, action_items);
        info!(
            claimed = digest.total_claimed(),
            action_items = digest.total_action_items(),
            "Triage run complete"
        );
        Ok(digest)
    }

    /// Priority-ordered pooled stages over a shrinking unclaimed pool.
    async fn categorize_pooled(
        &self,
        pool: &[Conversation],
        registry: &mut ClaimRegistry,
    ) -> Result<BTreeMap<Category, Vec<Claimed>>, Error> {
        let mut claims: BTreeMap<Category, Vec<Claimed>> = BTreeMap::new();

        for category in Category::PRIORITY {
            let unclaimed = registry.unclaimed(pool);
            if unclaimed.is_empty() {
                break;
            }

            let decisions =
                run_pooled_stage(self.oracle.as_ref(), self.retry, category, &unclaimed)
                    .await
                    .map_err(|source| PipelineError::Categorize {
                        stage: category.label(),
                        source,
                    })?;

            let mut requested: HashMap<&str, String> = HashMap::new();
            for decision in &decisions {
                requested
                    .entry(decision.conversation_id.as_str())
                    .or_insert_with(|| decision.summary.clone());
            }

            let pool_ids: HashSet<&str> = unclaimed.iter().map(|c| c.id.as_str()).collect();
            registry.claim(category.label(), requested.keys().copied(), &pool_ids);

            // Pool order, and only IDs that were actually unclaimed: the
            // oracle naming anything else is advisory noise.
            let newly: Vec<Claimed> = unclaimed
                .iter()
                .filter(|c| requested.contains_key(c.id.as_str()))
                .map(|c| Claimed {
                    conversation: (*c).clone(),
                    summary: requested.get(c.id.as_str()).cloned(),
                })
                .collect();

            if !newly.is_empty() {
                claims.insert(category, newly);
            }
        }

        Ok(claims)
    }

    /// One combined stage: classify every conversation individually, then
    /// group by the returned category. `skip` never reaches the digest.
    async fn categorize_each(
        &self,
        pool: &[Conversation],
        registry: &mut ClaimRegistry,
    ) -> Result<BTreeMap<Category, Vec<Claimed>>, Error> {
        let unclaimed = registry.unclaimed(pool);
        let assignments = classify_each(
            self.oracle.as_ref(),
            self.retry,
            &self.batcher,
            &unclaimed,
        )
        .await
        .map_err(|source| PipelineError::Categorize {
            stage: "categorize_all",
            source,
        })?;

        let mut grouped: HashMap<&str, Category> = HashMap::new();
        let mut skipped = 0usize;
        for (id, assignment) in &assignments {
            match assignment {
                Assignment::Category(category) => {
                    grouped.insert(id.as_str(), *category);
                }
                Assignment::Skip => skipped += 1,
            }
        }
        info!(skipped, "Skipped personal correspondence");

        let pool_ids: HashSet<&str> = unclaimed.iter().map(|c| c.id.as_str()).collect();
        let mut claims: BTreeMap<Category, Vec<Claimed>> = BTreeMap::new();
        for category in Category::PRIORITY {
            let ids: Vec<&str> = unclaimed
                .iter()
                .map(|c| c.id.as_str())
                .filter(|id| grouped.get(id) == Some(&category))
                .collect();
            if ids.is_empty() {
                continue;
            }
            registry.claim(category.label(), ids.iter().copied(), &pool_ids);
            let newly: Vec<Claimed> = unclaimed
                .iter()
                .filter(|c| ids.contains(&c.id.as_str()))
                .map(|c| Claimed {
                    conversation: (*c).clone(),
                    summary: None,
                })
                .collect();
            claims.insert(category, newly);
        }

        Ok(claims)
    }
}
