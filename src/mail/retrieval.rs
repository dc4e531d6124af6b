//! Mail retrieval — pure I/O, no triage logic.
//!
//! The pipeline consumes a `MailRetriever` and never sees HTTP. The Gmail
//! REST implementation here is deliberately thin: search for conversation
//! IDs, fetch details, truncate bodies. Pagination and provider-side rate
//! limiting stay with the provider client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::MailError;
use crate::mail::types::{Conversation, ConversationDetails, ConversationStub};

/// Body text is truncated to this many characters before entering the
/// pipeline; oracle prompts never need more.
pub const MAX_BODY_CHARS: usize = 2000;

/// One configured mail account.
#[derive(Debug, Clone)]
pub struct Account {
    /// Display name, used to group claimed IDs for downstream archiving.
    pub name: String,
    /// Provider access token.
    pub token: String,
}

/// Trait for mail retrieval backends.
#[async_trait]
pub trait MailRetriever: Send + Sync {
    /// Search an account for conversations matching a provider query.
    async fn search(
        &self,
        account: &Account,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ConversationStub>, MailError>;

    /// Fetch full details for one conversation.
    async fn fetch_details(
        &self,
        account: &Account,
        id: &str,
    ) -> Result<ConversationDetails, MailError>;
}

/// Assemble the raw conversation pool across every configured account.
///
/// No accounts configured is not an error: the pool is empty and the
/// pipeline completes with an empty digest. A failing account is skipped
/// with a warning rather than sinking the whole run; retrieval is a
/// collaborator, not a pipeline stage.
pub async fn assemble_pool(
    retriever: &dyn MailRetriever,
    accounts: &[Account],
    query: &str,
    limit: usize,
) -> Vec<Conversation> {
    let mut pool = Vec::new();
    let mut seen_accounts = std::collections::HashSet::new();

    for account in accounts {
        // Tolerate duplicate account entries.
        if !seen_accounts.insert(account.name.as_str()) {
            warn!(account = %account.name, "Duplicate account entry, skipping");
            continue;
        }

        let stubs = match retriever.search(account, query, limit).await {
            Ok(stubs) => stubs,
            Err(e) => {
                warn!(account = %account.name, error = %e, "Search failed, skipping account");
                continue;
            }
        };

        for stub in stubs {
            match retriever.fetch_details(account, &stub.id).await {
                Ok(mut details) => {
                    details.body = truncate_chars(&details.body, MAX_BODY_CHARS);
                    if details.snippet.is_empty() {
                        details.snippet = stub.snippet.clone();
                    }
                    pool.push(Conversation::from_parts(
                        stub.id,
                        account.name.clone(),
                        details,
                    ));
                }
                Err(e) => {
                    warn!(id = %stub.id, error = %e, "Detail fetch failed, skipping conversation");
                }
            }
        }
    }

    info!(pool = pool.len(), accounts = accounts.len(), "Assembled conversation pool");
    pool
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ── Gmail REST implementation ───────────────────────────────────────

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail retrieval over the REST API.
pub struct GmailRetriever {
    http: reqwest::Client,
}

impl GmailRetriever {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct ThreadListResponse {
    #[serde(default)]
    threads: Vec<ThreadStub>,
}

#[derive(Debug, Deserialize)]
struct ThreadStub {
    id: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct ThreadDetailResponse {
    #[serde(default)]
    messages: Vec<GmailMessage>,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    #[serde(default)]
    headers: Vec<GmailHeader>,
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    #[serde(default)]
    data: Option<String>,
}

#[async_trait]
impl MailRetriever for GmailRetriever {
    async fn search(
        &self,
        account: &Account,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ConversationStub>, MailError> {
        let url = format!("{GMAIL_API_BASE}/threads");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&account.token)
            .query(&[("q", query), ("maxResults", &limit.to_string())])
            .send()
            .await
            .map_err(|e| MailError::SearchFailed {
                account: account.name.clone(),
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MailError::AuthFailed {
                account: account.name.clone(),
            });
        }

        let listing: ThreadListResponse =
            response.json().await.map_err(|e| MailError::SearchFailed {
                account: account.name.clone(),
                reason: format!("bad listing payload: {e}"),
            })?;

        Ok(listing
            .threads
            .into_iter()
            .map(|t| ConversationStub {
                id: t.id,
                snippet: t.snippet,
            })
            .collect())
    }

    async fn fetch_details(
        &self,
        account: &Account,
        id: &str,
    ) -> Result<ConversationDetails, MailError> {
        let url = format!("{GMAIL_API_BASE}/threads/{id}");
        let thread: ThreadDetailResponse = self
            .http
            .get(&url)
            .bearer_auth(&account.token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| MailError::FetchFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| MailError::FetchFailed {
                id: id.to_string(),
                reason: format!("bad thread payload: {e}"),
            })?;

        let first = thread.messages.first().ok_or_else(|| MailError::FetchFailed {
            id: id.to_string(),
            reason: "thread has no messages".into(),
        })?;

        let header = |name: &str| -> String {
            first
                .payload
                .as_ref()
                .and_then(|p| {
                    p.headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case(name))
                        .map(|h| h.value.clone())
                })
                .unwrap_or_default()
        };

        let body = first
            .payload
            .as_ref()
            .and_then(extract_text)
            .unwrap_or_else(|| first.snippet.clone());

        Ok(ConversationDetails {
            subject: header("Subject"),
            from: header("From"),
            date: header("Date"),
            body,
            snippet: first.snippet.clone(),
            message_ids: thread.messages.iter().map(|m| m.id.clone()).collect(),
        })
    }
}

/// Pull the first text body out of a (possibly nested) MIME payload.
fn extract_text(payload: &GmailPayload) -> Option<String> {
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        if let Some(text) = decode_base64url(data) {
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
    }
    payload.parts.iter().find_map(extract_text)
}

/// Gmail encodes body data as URL-safe base64 without padding.
fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}
