use std::collections::VecDeque;

use crate::{domain::ChatId, storage::Storage, Result};

/// How an admin quick-reply picks its target from the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplySelector {
    MostRecent,
    /// 1-based position in the list, 1 = most recent.
    Position(usize),
}

/// Bounded, ordered, deduplicated list of the user chats that contacted the
/// bot most recently. Front = most recent. Lets the admin reply without an
/// explicit reply-link.
///
/// Capacity is 1..=20 (enforced by config), so linear scans stay
/// constant-bounded.
#[derive(Debug)]
pub struct RecentChats {
    capacity: usize,
    order: VecDeque<ChatId>,
}

impl RecentChats {
    pub fn new(capacity: usize) -> Self {
        debug_assert!((1..=20).contains(&capacity));
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Rebuild from the store so quick-reply survives restarts: touch in
    /// reverse so the most recently seen chat ends up at the front.
    pub async fn rebuild(storage: &dyn Storage, capacity: usize) -> Result<Self> {
        let mut ledger = Self::new(capacity);
        let recent = storage.list_recent_chats(capacity).await?;
        for chat in recent.into_iter().rev() {
            ledger.touch(chat);
        }
        Ok(ledger)
    }

    /// Move `chat` to the front, inserting it if absent. Evicts the
    /// least-recently-touched entry when capacity is exceeded.
    pub fn touch(&mut self, chat: ChatId) {
        self.order.retain(|&c| c != chat);
        self.order.push_front(chat);
        if self.order.len() > self.capacity {
            self.order.pop_back();
        }
    }

    pub fn list(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.order.iter().copied()
    }

    pub fn resolve(&self, selector: ReplySelector) -> Option<ChatId> {
        match selector {
            ReplySelector::MostRecent => self.order.front().copied(),
            ReplySelector::Position(0) => None,
            ReplySelector::Position(n) => self.order.get(n - 1).copied(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
