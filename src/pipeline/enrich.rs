//! Enricher stages — category-specific structured facts.
//!
//! Each category that supports enrichment gets one oracle call over only the
//! conversations that category claimed. Payloads are closed tagged variants,
//! never loosely-typed maps. High-volume low-signal categories are rolled up
//! into one narrative sentence per category instead; per-item detail is not
//! worth surfacing for those.
//!
//! Enrichers for different categories are independent: they read disjoint
//! claimed sets and write disjoint result maps, so they run as one set of
//! concurrent futures with a shared settle point.

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OracleError, PipelineError};
use crate::oracle::retry::{RetryPolicy, call_with_retry};
use crate::oracle::{Oracle, decode};
use crate::pipeline::Claimed;
use crate::pipeline::category::Category;

// ── Enrichment payloads ─────────────────────────────────────────────

/// One itemized line on a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item: String,
    pub amount: String,
}

/// Category-specific structured facts for one claimed conversation.
///
/// Amounts are display strings as they appear in the mail ("$23.45"); the
/// pipeline never does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Enrichment {
    /// A charge or fee: family and crowdfunding conversations.
    Billing { amount: String, description: String },
    /// A purchase: Amazon and generic receipts.
    Receipt { total: String, items: Vec<LineItem> },
    /// Newsletter links; either may be absent from the mail.
    Newsletter {
        view_link: Option<String>,
        unsubscribe_link: Option<String>,
    },
    /// Generic financial notification.
    Financial {
        description: String,
        amount: Option<String>,
    },
}

/// Which enrichment shape a category produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnrichKind {
    Billing,
    Receipt,
    Newsletter,
    Financial,
    Aggregate,
}

fn kind_for(category: Category) -> EnrichKind {
    match category {
        Category::Family | Category::Crowdfunding => EnrichKind::Billing,
        Category::Amazon | Category::Receipts => EnrichKind::Receipt,
        Category::Newsletters => EnrichKind::Newsletter,
        Category::Investments | Category::FinancialNotices => EnrichKind::Financial,
        Category::Marketing
        | Category::Shipping
        | Category::SecurityAlerts
        | Category::ConfirmationCodes
        | Category::Reminders
        | Category::Notifications => EnrichKind::Aggregate,
    }
}

// ── Enrichment run ──────────────────────────────────────────────────

/// Output of the enrichment phase.
#[derive(Debug, Default)]
pub struct EnrichmentOutput {
    /// Per-item structured records, keyed by conversation ID.
    pub records: HashMap<String, Enrichment>,
    /// Aggregate narrative summaries for the rolled-up categories.
    pub summaries: BTreeMap<Category, String>,
}

/// Result of enriching one category.
enum CategoryEnrichment {
    PerItem(Vec<(String, Enrichment)>),
    Aggregate(String),
}

/// Enrich every claimed category concurrently.
///
/// All enricher futures settle together; the first failure aborts the run
/// with the failing stage named.
pub async fn enrich_claims(
    oracle: &dyn Oracle,
    retry: RetryPolicy,
    claims: &BTreeMap<Category, Vec<Claimed>>,
) -> Result<EnrichmentOutput, PipelineError> {
    let futures = claims
        .iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(category, items)| async move {
            enrich_category(oracle, retry, *category, items)
                .await
                .map(|enrichment| (*category, enrichment))
                .map_err(|source| PipelineError::Enrich {
                    stage: category.label(),
                    source,
                })
        });

    let mut output = EnrichmentOutput::default();
    for settled in join_all(futures).await {
        let (category, enrichment) = settled?;
        match enrichment {
            CategoryEnrichment::PerItem(records) => {
                for (id, record) in records {
                    output.records.insert(id, record);
                }
            }
            CategoryEnrichment::Aggregate(summary) => {
                output.summaries.insert(category, summary);
            }
        }
    }

    info!(
        records = output.records.len(),
        summaries = output.summaries.len(),
        "Enrichment complete"
    );
    Ok(output)
}

async fn enrich_category(
    oracle: &dyn Oracle,
    retry: RetryPolicy,
    category: Category,
    items: &[Claimed],
) -> Result<CategoryEnrichment, OracleError> {
    let kind = kind_for(category);
    let system = enrich_system_prompt(category, kind);
    let prompt = enrich_user_prompt(items);
    let raw = call_with_retry(retry, || oracle.classify(&system, &prompt)).await?;

    if kind == EnrichKind::Aggregate {
        #[derive(Deserialize)]
        struct AggregateAnswer {
            summary: String,
        }
        let answer: AggregateAnswer = decode(&raw)?;
        return Ok(CategoryEnrichment::Aggregate(answer.summary));
    }

    // Enrichment only exists for claimed conversations; IDs the oracle
    // invents are dropped.
    let claimed_ids: HashSet<&str> = items.iter().map(|c| c.conversation.id.as_str()).collect();
    let records = decode_per_item(kind, &raw)?
        .into_iter()
        .filter(|(id, _)| {
            let known = claimed_ids.contains(id.as_str());
            if !known {
                debug!(stage = category.label(), id = %id, "Dropped enrichment for unknown ID");
            }
            known
        })
        .collect();
    Ok(CategoryEnrichment::PerItem(records))
}

fn decode_per_item(kind: EnrichKind, raw: &str) -> Result<Vec<(String, Enrichment)>, OracleError> {
    // Wire rows tolerate partial data: missing fields default, amounts may
    // be null where the mail carries none.
    match kind {
        EnrichKind::Billing => {
            #[derive(Deserialize)]
            struct Row {
                conversation_id: String,
                #[serde(default)]
                amount: String,
                #[serde(default)]
                description: String,
            }
            let rows: Vec<Row> = decode(raw)?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    (
                        r.conversation_id,
                        Enrichment::Billing {
                            amount: r.amount,
                            description: r.description,
                        },
                    )
                })
                .collect())
        }
        EnrichKind::Receipt => {
            #[derive(Deserialize)]
            struct Row {
                conversation_id: String,
                #[serde(default)]
                total: String,
                #[serde(default)]
                items: Vec<LineItem>,
            }
            let rows: Vec<Row> = decode(raw)?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    (
                        r.conversation_id,
                        Enrichment::Receipt {
                            total: r.total,
                            items: r.items,
                        },
                    )
                })
                .collect())
        }
        EnrichKind::Newsletter => {
            #[derive(Deserialize)]
            struct Row {
                conversation_id: String,
                #[serde(default)]
                view_link: Option<String>,
                #[serde(default)]
                unsubscribe_link: Option<String>,
            }
            let rows: Vec<Row> = decode(raw)?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    (
                        r.conversation_id,
                        Enrichment::Newsletter {
                            view_link: r.view_link,
                            unsubscribe_link: r.unsubscribe_link,
                        },
                    )
                })
                .collect())
        }
        EnrichKind::Financial => {
            #[derive(Deserialize)]
            struct Row {
                conversation_id: String,
                #[serde(default)]
                description: String,
                #[serde(default)]
                amount: Option<String>,
            }
            let rows: Vec<Row> = decode(raw)?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    (
                        r.conversation_id,
                        Enrichment::Financial {
                            description: r.description,
                            amount: r.amount,
                        },
                    )
                })
                .collect())
        }
        EnrichKind::Aggregate => unreachable!("aggregate handled before per-item decode"),
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

fn enrich_system_prompt(category: Category, kind: EnrichKind) -> String {
    let fields = match kind {
        EnrichKind::Billing => {
            "[{\"conversation_id\": \"...\", \"amount\": \"$0.00\", \
             \"description\": \"one line\"}]"
        }
        EnrichKind::Receipt => {
            "[{\"conversation_id\": \"...\", \"total\": \"$0.00\", \
             \"items\": [{\"item\": \"...\", \"amount\": \"$0.00\"}]}]"
        }
        EnrichKind::Newsletter => {
            "[{\"conversation_id\": \"...\", \"view_link\": \"url or null\", \
             \"unsubscribe_link\": \"url or null\"}]"
        }
        EnrichKind::Financial => {
            "[{\"conversation_id\": \"...\", \"description\": \"one line\", \
             \"amount\": \"$0.00 or null\"}]"
        }
        EnrichKind::Aggregate => {
            return format!(
                "You are summarizing a batch of {label} emails. Write ONE short \
                 sentence in the form \"Service: what happened\" covering the \
                 batch as a whole.\n\n\
                 Respond with ONLY a JSON object: {{\"summary\": \"...\"}}",
                label = category.label()
            );
        }
    };
    format!(
        "You are extracting structured facts from {label} emails \
         ({criterion}).\n\n\
         Respond with ONLY a JSON array, one object per conversation:\n\
         {fields}\n\n\
         Copy amounts exactly as written in the email. Use null for fields \
         the email does not contain.",
        label = category.label(),
        criterion = category.criterion(),
    )
}

fn enrich_user_prompt(items: &[Claimed]) -> String {
    let mut prompt = String::with_capacity(items.len() * 256);
    prompt.push_str("Conversations:\n\n");
    for claimed in items {
        prompt.push_str(&claimed.conversation.prompt_block());
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::mail::types::Conversation;

    fn claimed(id: &str) -> Claimed {
        Claimed {
            conversation: Conversation {
                id: id.into(),
                subject: "s".into(),
                from: "f".into(),
                date: "d".into(),
                body: "b".into(),
                snippet: "sn".into(),
                account: "acct".into(),
                message_ids: vec![],
            },
            summary: None,
        }
    }

    /// Oracle keyed on a substring of the system prompt.
    struct ScriptedOracle {
        responses: Vec<(&'static str, String)>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn classify(&self, system: &str, _prompt: &str) -> Result<String, OracleError> {
            self.prompts.lock().unwrap().push(system.to_string());
            for (needle, response) in &self.responses {
                if system.contains(needle) {
                    return Ok(response.clone());
                }
            }
            Err(OracleError::RequestFailed {
                reason: format!("no scripted response for: {system}"),
            })
        }
    }

    #[tokio::test]
    async fn structured_and_aggregate_categories_both_enrich() {
        let oracle = ScriptedOracle {
            responses: vec![
                (
                    "amazon",
                    r#"[{"conversation_id": "a1", "total": "$42.00",
                        "items": [{"item": "cable", "amount": "$42.00"}]}]"#
                        .into(),
                ),
                (
                    "shipping",
                    r#"{"summary": "UPS: two packages delivered this week."}"#.into(),
                ),
            ],
            prompts: Mutex::new(vec![]),
        };

        let mut claims = BTreeMap::new();
        claims.insert(Category::Amazon, vec![claimed("a1")]);
        claims.insert(Category::Shipping, vec![claimed("s1"), claimed("s2")]);

        let output = enrich_claims(&oracle, RetryPolicy::default(), &claims)
            .await
            .unwrap();

        match output.records.get("a1").unwrap() {
            Enrichment::Receipt { total, items } => {
                assert_eq!(total, "$42.00");
                assert_eq!(items.len(), 1);
            }
            other => panic!("Expected Receipt, got {:?}", other),
        }
        assert_eq!(
            output.summaries.get(&Category::Shipping).unwrap(),
            "UPS: two packages delivered this week."
        );
    }

    #[tokio::test]
    async fn enrichment_for_unknown_id_is_dropped() {
        let oracle = ScriptedOracle {
            responses: vec![(
                "newsletters",
                r#"[{"conversation_id": "ghost", "view_link": null, "unsubscribe_link": null},
                    {"conversation_id": "n1", "view_link": "https://x.com/v", "unsubscribe_link": null}]"#
                    .into(),
            )],
            prompts: Mutex::new(vec![]),
        };

        let mut claims = BTreeMap::new();
        claims.insert(Category::Newsletters, vec![claimed("n1")]);

        let output = enrich_claims(&oracle, RetryPolicy::default(), &claims)
            .await
            .unwrap();

        assert_eq!(output.records.len(), 1);
        assert!(output.records.contains_key("n1"));
    }

    #[tokio::test]
    async fn empty_categories_make_no_oracle_calls() {
        let oracle = ScriptedOracle {
            responses: vec![],
            prompts: Mutex::new(vec![]),
        };
        let mut claims = BTreeMap::new();
        claims.insert(Category::Family, Vec::new());

        let output = enrich_claims(&oracle, RetryPolicy::default(), &claims)
            .await
            .unwrap();
        assert!(output.records.is_empty());
        assert!(oracle.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_enricher_names_its_stage() {
        let oracle = ScriptedOracle {
            responses: vec![],
            prompts: Mutex::new(vec![]),
        };
        let mut claims = BTreeMap::new();
        claims.insert(Category::Investments, vec![claimed("i1")]);

        let err = enrich_claims(&oracle, RetryPolicy::default(), &claims)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Enrich { stage: "investments", .. }
        ));
    }

    #[test]
    fn partial_rows_tolerate_missing_fields() {
        let rows = decode_per_item(
            EnrichKind::Financial,
            r#"[{"conversation_id": "f1", "description": "payment posted"}]"#,
        )
        .unwrap();
        match &rows[0].1 {
            Enrichment::Financial { description, amount } => {
                assert_eq!(description, "payment posted");
                assert!(amount.is_none());
            }
            other => panic!("Expected Financial, got {:?}", other),
        }
    }

    #[test]
    fn enrichment_serde_tags_by_kind() {
        let e = Enrichment::Billing {
            amount: "$10".into(),
            description: "field trip".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "billing");
        assert_eq!(json["amount"], "$10");
    }

    #[test]
    fn every_category_maps_to_exactly_one_kind() {
        for category in Category::PRIORITY {
            let kind = kind_for(category);
            assert_eq!(
                category.summarized_in_aggregate(),
                kind == EnrichKind::Aggregate,
                "{:?} aggregate flag disagrees with its enrichment kind",
                category
            );
        }
    }
}
