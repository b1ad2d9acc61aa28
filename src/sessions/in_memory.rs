//! In-memory conversation store implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{
    Conversation, ConversationFilter, ConversationKey, ConversationStore, TranscriptEntry,
};

/// An in-memory conversation store backed by mutex-protected hash maps.
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<ConversationKey, Conversation>>,
    transcripts: Mutex<HashMap<ConversationKey, Vec<TranscriptEntry>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            transcripts: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, key: &ConversationKey) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            key: key.clone(),
            created_at: now,
            last_activity: now,
        };

        self.conversations
            .lock()
            .insert(key.clone(), conversation.clone());
        self.transcripts.lock().remove(key);
        Ok(conversation)
    }

    async fn get(&self, key: &ConversationKey) -> Result<Option<Conversation>> {
        Ok(self.conversations.lock().get(key).cloned())
    }

    async fn ensure(&self, key: &ConversationKey) -> Result<Conversation> {
        let mut conversations = self.conversations.lock();
        let conversation = conversations.entry(key.clone()).or_insert_with(|| {
            let now = Utc::now();
            Conversation {
                key: key.clone(),
                created_at: now,
                last_activity: now,
            }
        });
        Ok(conversation.clone())
    }

    async fn list(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let conversations = self.conversations.lock();
        let mut results: Vec<Conversation> = conversations
            .values()
            .filter(|c| {
                if let Some(ref app) = filter.app {
                    if c.key.app != *app {
                        return false;
                    }
                }
                if let Some(ref user_id) = filter.user_id {
                    if c.key.user_id != *user_id {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn delete(&self, key: &ConversationKey) -> Result<()> {
        self.conversations.lock().remove(key);
        self.transcripts.lock().remove(key);
        Ok(())
    }

    async fn append_transcript(
        &self,
        key: &ConversationKey,
        entry: TranscriptEntry,
    ) -> Result<()> {
        let timestamp = entry.timestamp;
        {
            let mut conversations = self.conversations.lock();
            let conversation = conversations
                .entry(key.clone())
                .or_insert_with(|| Conversation {
                    key: key.clone(),
                    created_at: timestamp,
                    last_activity: timestamp,
                });
            if timestamp > conversation.last_activity {
                conversation.last_activity = timestamp;
            }
        }

        self.transcripts
            .lock()
            .entry(key.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn get_transcript(
        &self,
        key: &ConversationKey,
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptEntry>> {
        let transcripts = self.transcripts.lock();
        let Some(entries) = transcripts.get(key) else {
            return Ok(Vec::new());
        };

        let start = limit.map_or(0, |n| entries.len().saturating_sub(n));
        Ok(entries[start..].to_vec())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
