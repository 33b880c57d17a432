use crate::domain::{ChatId, MessageRef};

/// Cross-messenger inbound event, as the routing core sees it.
///
/// Platform-specific fields (media kinds, entities, formatting) stay in the
/// adapter; the core only needs identity, context and reply hints.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    /// Chat the event arrived from.
    pub source_chat: ChatId,
    /// The inbound message itself; forwarded verbatim for user messages,
    /// copied verbatim for link-based admin replies.
    pub source_msg: MessageRef,
    /// Verified sender username, if the platform exposes one.
    pub sender_username: Option<String>,
    pub is_group: bool,
    /// Message this event replied to, when the sender used a reply-link.
    pub reply_link: Option<MessageRef>,
    /// 1-based quick-reply selector parsed from the text (`#2 ...`).
    pub selector: Option<usize>,
    /// Admin reply text with the selector token stripped. `None` means the
    /// original message should be relayed as-is.
    pub reply_text: Option<String>,
}

impl InboundEvent {
    /// Plain event with no reply hints; the common case for user messages.
    pub fn plain(
        source_chat: ChatId,
        source_msg: MessageRef,
        sender_username: Option<String>,
        is_group: bool,
    ) -> Self {
        Self {
            source_chat,
            source_msg,
            sender_username,
            is_group,
            reply_link: None,
            selector: None,
            reply_text: None,
        }
    }
}
