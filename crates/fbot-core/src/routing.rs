use crate::{
    domain::{ChatId, MessageRef},
    messaging::InboundEvent,
};

/// What an inbound event is, routing-wise. Every event lands in exactly one
/// of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Private message from a non-admin: forward to all admin destinations.
    UserMessage,
    /// Message from the verified administrator: route back to a user chat.
    /// When both a link and a selector are present the explicit link wins.
    AdminReply {
        link: Option<MessageRef>,
        selector: Option<usize>,
    },
    /// No routing context (group chatter from non-admins, senderless
    /// service events). No forwarding, no state change, no error.
    Ignore,
}

/// Classifies inbound events against the configured admin identity.
#[derive(Clone, Debug)]
pub struct Resolver {
    admin_username: String,
    destinations: Vec<ChatId>,
}

impl Resolver {
    pub fn new(admin_username: String, destinations: Vec<ChatId>) -> Self {
        Self {
            admin_username,
            destinations,
        }
    }

    /// Identity check is by username only; being in the shared group grants
    /// nothing.
    pub fn is_admin(&self, username: Option<&str>) -> bool {
        username == Some(self.admin_username.as_str())
    }

    pub fn destinations(&self) -> &[ChatId] {
        &self.destinations
    }

    pub fn classify(&self, event: &InboundEvent) -> Classification {
        if self.is_admin(event.sender_username.as_deref()) {
            return Classification::AdminReply {
                link: event.reply_link,
                selector: event.selector,
            };
        }
        if event.is_group {
            return Classification::Ignore;
        }
        Classification::UserMessage
    }
}
