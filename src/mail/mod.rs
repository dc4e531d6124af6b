//! Mail provider integration: conversation model and retrieval.

pub mod retrieval;
pub mod types;

pub use retrieval::{Account, GmailRetriever, MailRetriever, assemble_pool};
pub use types::{Conversation, ConversationDetails, ConversationStub};
