use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageRef},
    storage::port::Storage,
    Result,
};

#[derive(Debug, Default)]
struct Inner {
    forwards: HashMap<MessageRef, ChatId>,
    last_seen: HashMap<ChatId, DateTime<Utc>>,
}

/// In-memory `Storage` with the same contract as the durable one.
///
/// Used by the coordinator tests and for ephemeral deployments where losing
/// routing state on restart is acceptable.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded forward mappings (test observability).
    pub async fn forward_count(&self) -> usize {
        self.inner.lock().await.forwards.len()
    }

    /// Number of chats with a recorded last-seen time (test observability).
    pub async fn seen_count(&self) -> usize {
        self.inner.lock().await.last_seen.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put_forward_mapping(&self, forwarded: MessageRef, origin: ChatId) -> Result<()> {
        self.inner.lock().await.forwards.insert(forwarded, origin);
        Ok(())
    }

    async fn get_origin(&self, forwarded: MessageRef) -> Result<Option<ChatId>> {
        Ok(self.inner.lock().await.forwards.get(&forwarded).copied())
    }

    async fn record_chat_seen(&self, chat: ChatId, at: DateTime<Utc>) -> Result<()> {
        self.inner.lock().await.last_seen.insert(chat, at);
        Ok(())
    }

    async fn list_recent_chats(&self, limit: usize) -> Result<Vec<ChatId>> {
        let inner = self.inner.lock().await;
        let mut seen: Vec<(ChatId, DateTime<Utc>)> =
            inner.last_seen.iter().map(|(&c, &at)| (c, at)).collect();
        seen.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(seen.into_iter().take(limit).map(|(c, _)| c).collect())
    }
}
