//! Conversation storage traits and types shared by the chat agent and its
//! delegated sub-agents.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::ChatMessage;

/// Composite key identifying one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    /// Owning agent, so root and delegated conversations never collide.
    pub app: String,
    pub user_id: String,
    pub session_id: String,
}

impl ConversationKey {
    pub fn new(app: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app: app.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// A tracked conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub key: ConversationKey,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// A single entry in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role.as_str() {
            "assistant" => ChatMessage::assistant(self.content.clone()),
            "system" => ChatMessage::system(self.content.clone()),
            _ => ChatMessage::user(self.content.clone()),
        }
    }
}

/// Filter criteria for listing conversations.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub app: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

/// Storage for agent conversations and their transcripts.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation, replacing any existing one with the same key.
    async fn create(&self, key: &ConversationKey) -> Result<Conversation>;

    /// Get an existing conversation by key, if it exists.
    async fn get(&self, key: &ConversationKey) -> Result<Option<Conversation>>;

    /// Return the conversation, creating it first when missing.
    async fn ensure(&self, key: &ConversationKey) -> Result<Conversation> {
        match self.get(key).await? {
            Some(existing) => Ok(existing),
            None => self.create(key).await,
        }
    }

    /// List conversations matching the filter, most recently active first.
    async fn list(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>>;

    /// Delete a conversation and its transcript.
    async fn delete(&self, key: &ConversationKey) -> Result<()>;

    /// Append an entry to the transcript and bump the activity timestamp.
    async fn append_transcript(&self, key: &ConversationKey, entry: TranscriptEntry)
        -> Result<()>;

    /// Retrieve transcript entries, keeping only the most recent `limit`.
    async fn get_transcript(
        &self,
        key: &ConversationKey,
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptEntry>>;

    /// The name of this store implementation.
    fn name(&self) -> &str;
}
