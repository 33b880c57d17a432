//! Telegram adapter: implements the core delivery port over the Bot API and
//! maps incoming updates into the core's inbound-event model.

pub mod router;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId as TgChatId, MessageId as TgMessageId};

use fbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::Delivery,
    Error, Result,
};

pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn delivery_err(dest: ChatId, e: teloxide::RequestError) -> Error {
    Error::DeliveryFailed {
        chat_id: dest.0,
        reason: e.to_string(),
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    // Native forwards carry the sender header, so `origin` needs no extra
    // attribution message here.
    async fn forward(
        &self,
        dest: ChatId,
        source: MessageRef,
        _origin: ChatId,
    ) -> Result<MessageRef> {
        let msg = self
            .bot
            .forward_message(
                TgChatId(dest.0),
                TgChatId(source.chat_id.0),
                TgMessageId(source.message_id.0),
            )
            .await
            .map_err(|e| delivery_err(dest, e))?;
        Ok(MessageRef::new(dest, MessageId(msg.id.0)))
    }

    async fn copy(&self, dest: ChatId, source: MessageRef) -> Result<MessageRef> {
        let msg_id = self
            .bot
            .copy_message(
                TgChatId(dest.0),
                TgChatId(source.chat_id.0),
                TgMessageId(source.message_id.0),
            )
            .await
            .map_err(|e| delivery_err(dest, e))?;
        Ok(MessageRef::new(dest, MessageId(msg_id.0)))
    }

    async fn send_text(&self, dest: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_message(TgChatId(dest.0), text)
            .await
            .map_err(|e| delivery_err(dest, e))?;
        Ok(MessageRef::new(dest, MessageId(msg.id.0)))
    }
}
