use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Hexagonal port for outbound delivery.
///
/// Telegram is the first implementation. Each call returns the platform's
/// id for the delivered message so the caller can persist forward mappings.
/// Implementations map their transport errors into `Error::DeliveryFailed`.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Relay a user's message to an admin destination, keeping visible
    /// origin attribution (e.g. Telegram's native forward header).
    async fn forward(&self, dest: ChatId, source: MessageRef, origin: ChatId)
        -> Result<MessageRef>;

    /// Relay an admin's message to a user chat without exposing where it
    /// was written (no forward header).
    async fn copy(&self, dest: ChatId, source: MessageRef) -> Result<MessageRef>;

    /// Plain text send; used for stripped quick-reply bodies and notices.
    async fn send_text(&self, dest: ChatId, text: &str) -> Result<MessageRef>;
}
