//! Conversation history: keeps multi-turn context for the chat agent and the
//! delegated DevOps agent.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemoryConversationStore;
pub use traits::{
    Conversation, ConversationFilter, ConversationKey, ConversationStore, TranscriptEntry,
};

use std::sync::Arc;

/// Create the default in-memory conversation store.
pub fn create_conversation_store() -> Arc<dyn ConversationStore> {
    Arc::new(InMemoryConversationStore::new())
}
