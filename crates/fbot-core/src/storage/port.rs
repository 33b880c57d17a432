use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Hexagonal port for the persistent routing store.
///
/// Two logical relations: `forwarded message -> origin chat` and
/// `chat -> last seen`. Implementations supply their own concurrency
/// control; every operation must be safe to call from concurrently
/// processed events. Losing a forward mapping makes a user's conversation
/// unreachable, so failed writes surface as errors, never silently.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Record that `forwarded` (as delivered to an admin destination)
    /// originated from `origin`. Idempotent upsert.
    async fn put_forward_mapping(&self, forwarded: MessageRef, origin: ChatId) -> Result<()>;

    /// Resolve a reply-link back to the originating user chat.
    ///
    /// `None` means the mapping is unknown (too old, never recorded) —
    /// a recoverable condition, not a storage failure.
    async fn get_origin(&self, forwarded: MessageRef) -> Result<Option<ChatId>>;

    /// Upsert the last-seen time used for recency ordering.
    async fn record_chat_seen(&self, chat: ChatId, at: DateTime<Utc>) -> Result<()>;

    /// Most-recent-first, deduplicated. Used to rebuild the ledger on start.
    async fn list_recent_chats(&self, limit: usize) -> Result<Vec<ChatId>>;
}
