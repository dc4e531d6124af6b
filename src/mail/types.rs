//! Conversation data model.
//!
//! A `Conversation` is the unit of classification: one message or thread as
//! pulled from the mail provider. The retrieval adapter builds these; the
//! pipeline never mutates them.

use serde::{Deserialize, Serialize};

/// A single inbox conversation, immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Provider-assigned unique ID.
    pub id: String,
    /// Subject line.
    pub subject: String,
    /// Raw "From" header.
    pub from: String,
    /// Display date string as the provider reports it.
    pub date: String,
    /// Body text, pre-truncated by the retrieval adapter.
    pub body: String,
    /// Provider snippet (short preview).
    pub snippet: String,
    /// Which mail account this conversation came from.
    pub account: String,
    /// Underlying message IDs, for thread-granularity archiving downstream.
    #[serde(default)]
    pub message_ids: Vec<String>,
}

/// Search result stub: ID plus snippet, before detail fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStub {
    pub id: String,
    #[serde(default)]
    pub snippet: String,
}

/// Full detail payload for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetails {
    pub subject: String,
    pub from: String,
    pub date: String,
    pub body: String,
    pub snippet: String,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

impl Conversation {
    /// Assemble a conversation from a stub plus fetched details.
    pub fn from_parts(id: String, account: String, details: ConversationDetails) -> Self {
        Self {
            id,
            subject: details.subject,
            from: details.from,
            date: details.date,
            body: details.body,
            snippet: details.snippet,
            account,
            message_ids: details.message_ids,
        }
    }

    /// Compact one-line rendering used inside oracle prompts.
    pub fn prompt_block(&self) -> String {
        format!(
            "ID: {}\nFrom: {}\nDate: {}\nSubject: {}\nBody: {}\n",
            self.id, self.from, self.date, self.subject, self.body
        )
    }
}
