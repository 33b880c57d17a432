use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tracing::{debug, error, info, warn};

use crate::{
    domain::MessageRef,
    errors::Error,
    ledger::{RecentChats, ReplySelector},
    messaging::{Delivery, InboundEvent},
    routing::{Classification, Resolver},
    storage::Storage,
    Result,
};

/// Per-chat serialization slots: events from the same source chat are
/// processed in arrival order, different chats proceed independently.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Drives resolver + ledger + storage + delivery for each inbound event.
///
/// Effect order for a user message is deliver, then persist the mapping per
/// delivered copy, then ledger/recency — an event abandoned mid-flight
/// leaves either "mapping exists and message sent" or "neither", never a
/// link to a message nobody received.
pub struct Coordinator {
    resolver: Resolver,
    storage: Arc<dyn Storage>,
    delivery: Arc<dyn Delivery>,
    ledger: Mutex<RecentChats>,
    locks: ChatLocks,
    permits: Semaphore,
}

impl Coordinator {
    pub fn new(
        resolver: Resolver,
        storage: Arc<dyn Storage>,
        delivery: Arc<dyn Delivery>,
        ledger: RecentChats,
        max_in_flight: usize,
    ) -> Self {
        Self {
            resolver,
            storage,
            delivery,
            ledger: Mutex::new(ledger),
            locks: ChatLocks::default(),
            permits: Semaphore::new(max_in_flight.max(1)),
        }
    }

    /// Process one inbound event to completion.
    ///
    /// Recoverable failures become a single notice to the event's source
    /// chat and are not retried: delivery is not idempotent at the transport
    /// layer, so a blind retry could duplicate messages.
    pub async fn process(&self, event: InboundEvent) {
        // Chat slot first, then the global permit: events queued behind the
        // same chat must not consume the ceiling while they wait.
        let _slot = self.locks.lock_chat(event.source_chat.0).await;
        let Ok(_permit) = self.permits.acquire().await else {
            return; // semaphore is never closed
        };

        if let Err(err) = self.route(&event).await {
            warn!(chat = event.source_chat.0, %err, "event failed");
            if let Err(notify_err) = self
                .delivery
                .send_text(event.source_chat, &err.notice())
                .await
            {
                error!(chat = event.source_chat.0, %notify_err, "failure notice undeliverable");
            }
        }
    }

    async fn route(&self, event: &InboundEvent) -> Result<()> {
        match self.resolver.classify(event) {
            Classification::Ignore => {
                debug!(chat = event.source_chat.0, "no routing context, ignored");
                Ok(())
            }
            Classification::UserMessage => self.forward_user_message(event).await,
            Classification::AdminReply { link, selector } => {
                self.deliver_admin_reply(event, link, selector).await
            }
        }
    }

    async fn forward_user_message(&self, event: &InboundEvent) -> Result<()> {
        let mut delivered = 0usize;
        let mut last_err = None;

        for &dest in self.resolver.destinations() {
            match self
                .delivery
                .forward(dest, event.source_msg, event.source_chat)
                .await
            {
                Ok(copy) => {
                    self.storage
                        .put_forward_mapping(copy, event.source_chat)
                        .await?;
                    delivered += 1;
                }
                // A dead destination must not starve the others.
                Err(err) => {
                    warn!(dest = dest.0, %err, "forward failed, continuing fan-out");
                    last_err = Some(err);
                }
            }
        }

        if delivered == 0 {
            if let Some(err) = last_err {
                return Err(err);
            }
            return Ok(()); // no destinations configured; config prevents this
        }

        self.ledger.lock().await.touch(event.source_chat);
        self.storage
            .record_chat_seen(event.source_chat, Utc::now())
            .await?;

        info!(chat = event.source_chat.0, delivered, "user message forwarded");
        Ok(())
    }

    async fn deliver_admin_reply(
        &self,
        event: &InboundEvent,
        link: Option<MessageRef>,
        selector: Option<usize>,
    ) -> Result<()> {
        let target = match link {
            // Explicit link wins over any selector in the same message.
            Some(link) => self
                .storage
                .get_origin(link)
                .await?
                .ok_or(Error::UnknownReplyTarget)?,
            None => {
                let ledger = self.ledger.lock().await;
                if ledger.is_empty() {
                    return Err(Error::NoActiveChat);
                }
                match selector {
                    Some(n) => {
                        ledger
                            .resolve(ReplySelector::Position(n))
                            .ok_or(Error::InvalidSelector {
                                selector: n,
                                len: ledger.len(),
                            })?
                    }
                    None => ledger
                        .resolve(ReplySelector::MostRecent)
                        .ok_or(Error::NoActiveChat)?,
                }
            }
        };

        match &event.reply_text {
            Some(text) => {
                self.delivery.send_text(target, text).await?;
            }
            None => {
                self.delivery.copy(target, event.source_msg).await?;
            }
        }

        info!(target = target.0, "admin reply delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicI32, Ordering},
            Mutex as StdMutex,
        },
    };

    use super::*;
    use crate::{
        domain::{ChatId, MessageId, MessageRef},
        storage::MemoryStorage,
    };

    const ADMIN: &str = "boss";
    const ADMIN_CHAT: i64 = 1;
    const GROUP_CHAT: i64 = -100;

    #[derive(Default)]
    struct FakeDelivery {
        forwards: StdMutex<Vec<(i64, MessageRef, i64)>>,
        copies: StdMutex<Vec<(i64, MessageRef)>>,
        texts: StdMutex<Vec<(i64, String)>>,
        fail_dests: StdMutex<HashSet<i64>>,
        next_id: AtomicI32,
    }

    impl FakeDelivery {
        fn alloc(&self, dest: ChatId) -> MessageRef {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1000;
            MessageRef::new(dest, MessageId(id))
        }

        fn fail_dest(&self, dest: i64) {
            self.fail_dests.lock().unwrap().insert(dest);
        }

        fn forwards(&self) -> Vec<(i64, MessageRef, i64)> {
            self.forwards.lock().unwrap().clone()
        }

        fn copies(&self) -> Vec<(i64, MessageRef)> {
            self.copies.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<(i64, String)> {
            self.texts.lock().unwrap().clone()
        }

        fn check(&self, dest: ChatId) -> Result<()> {
            if self.fail_dests.lock().unwrap().contains(&dest.0) {
                return Err(Error::DeliveryFailed {
                    chat_id: dest.0,
                    reason: "blocked".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Delivery for FakeDelivery {
        async fn forward(
            &self,
            dest: ChatId,
            source: MessageRef,
            origin: ChatId,
        ) -> Result<MessageRef> {
            self.check(dest)?;
            self.forwards
                .lock()
                .unwrap()
                .push((dest.0, source, origin.0));
            Ok(self.alloc(dest))
        }

        async fn copy(&self, dest: ChatId, source: MessageRef) -> Result<MessageRef> {
            self.check(dest)?;
            self.copies.lock().unwrap().push((dest.0, source));
            Ok(self.alloc(dest))
        }

        async fn send_text(&self, dest: ChatId, text: &str) -> Result<MessageRef> {
            self.check(dest)?;
            self.texts.lock().unwrap().push((dest.0, text.to_string()));
            Ok(self.alloc(dest))
        }
    }

    fn coordinator(
        chat_list_size: usize,
    ) -> (Arc<Coordinator>, Arc<MemoryStorage>, Arc<FakeDelivery>) {
        let storage = Arc::new(MemoryStorage::new());
        let delivery = Arc::new(FakeDelivery::default());
        let resolver = Resolver::new(
            ADMIN.to_string(),
            vec![ChatId(ADMIN_CHAT), ChatId(GROUP_CHAT)],
        );
        let coordinator = Arc::new(Coordinator::new(
            resolver,
            storage.clone(),
            delivery.clone(),
            RecentChats::new(chat_list_size),
            8,
        ));
        (coordinator, storage, delivery)
    }

    fn user_event(chat: i64, msg_id: i32) -> InboundEvent {
        InboundEvent::plain(
            ChatId(chat),
            MessageRef::new(ChatId(chat), MessageId(msg_id)),
            Some(format!("user{chat}")),
            false,
        )
    }

    fn admin_event(chat: i64, msg_id: i32, is_group: bool) -> InboundEvent {
        InboundEvent::plain(
            ChatId(chat),
            MessageRef::new(ChatId(chat), MessageId(msg_id)),
            Some(ADMIN.to_string()),
            is_group,
        )
    }

    #[tokio::test]
    async fn round_trip_user_message_then_link_reply() {
        let (coordinator, storage, delivery) = coordinator(5);

        coordinator.process(user_event(500, 9)).await;

        let forwards = delivery.forwards();
        assert_eq!(
            forwards.iter().map(|f| f.0).collect::<Vec<_>>(),
            vec![ADMIN_CHAT, GROUP_CHAT]
        );
        assert_eq!(storage.forward_count().await, 2);
        assert_eq!(storage.seen_count().await, 1);

        // Admin replies to the copy that landed in the admin chat.
        let link = MessageRef::new(ChatId(ADMIN_CHAT), MessageId(1000));
        assert_eq!(storage.get_origin(link).await.unwrap(), Some(ChatId(500)));

        let mut reply = admin_event(ADMIN_CHAT, 50, false);
        reply.reply_link = Some(link);
        coordinator.process(reply).await;

        let copies = delivery.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].0, 500);
        assert_eq!(
            copies[0].1,
            MessageRef::new(ChatId(ADMIN_CHAT), MessageId(50))
        );
        assert!(delivery.texts().is_empty(), "no notices on the happy path");
    }

    #[tokio::test]
    async fn reply_link_works_regardless_of_ledger_state() {
        let (coordinator, storage, delivery) = coordinator(1);

        // A messages, then B evicts A from the one-slot ledger.
        coordinator.process(user_event(201, 1)).await;
        coordinator.process(user_event(202, 1)).await;

        // Find the admin-chat copy that maps back to A.
        let mut a_link = None;
        for id in 1000..1010 {
            let candidate = MessageRef::new(ChatId(ADMIN_CHAT), MessageId(id));
            if storage.get_origin(candidate).await.unwrap() == Some(ChatId(201)) {
                a_link = Some(candidate);
                break;
            }
        }

        let mut reply = admin_event(ADMIN_CHAT, 60, false);
        reply.reply_link = a_link;
        coordinator.process(reply).await;

        assert_eq!(delivery.copies().last().map(|c| c.0), Some(201));
    }

    #[tokio::test]
    async fn unknown_link_notifies_admin_and_mutates_nothing() {
        let (coordinator, storage, delivery) = coordinator(5);

        let mut reply = admin_event(ADMIN_CHAT, 50, false);
        reply.reply_link = Some(MessageRef::new(ChatId(ADMIN_CHAT), MessageId(9999)));
        coordinator.process(reply).await;

        assert!(delivery.copies().is_empty());
        let texts = delivery.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, ADMIN_CHAT);
        assert_eq!(texts[0].1, Error::UnknownReplyTarget.notice());

        assert_eq!(storage.forward_count().await, 0);
        assert_eq!(storage.seen_count().await, 0);
    }

    #[tokio::test]
    async fn quick_reply_with_empty_ledger_is_no_active_chat() {
        let (coordinator, _storage, delivery) = coordinator(5);

        let mut reply = admin_event(ADMIN_CHAT, 50, false);
        reply.reply_text = Some("hello?".to_string());
        coordinator.process(reply).await;

        let texts = delivery.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, Error::NoActiveChat.notice());
    }

    #[tokio::test]
    async fn quick_reply_selector_out_of_range_is_reported() {
        let (coordinator, _storage, delivery) = coordinator(5);

        coordinator.process(user_event(300, 1)).await;

        let mut reply = admin_event(ADMIN_CHAT, 50, false);
        reply.selector = Some(5);
        reply.reply_text = Some("for #5".to_string());
        coordinator.process(reply).await;

        let notice = delivery
            .texts()
            .into_iter()
            .find(|(dest, _)| *dest == ADMIN_CHAT)
            .expect("admin must be notified");
        assert_eq!(
            notice.1,
            Error::InvalidSelector {
                selector: 5,
                len: 1
            }
            .notice()
        );
    }

    #[tokio::test]
    async fn quick_reply_goes_to_most_recent_after_a_b_c_d() {
        let (coordinator, _storage, delivery) = coordinator(3);

        for (chat, msg) in [(101, 1), (102, 1), (103, 1), (104, 1)] {
            coordinator.process(user_event(chat, msg)).await;
        }

        let mut reply = admin_event(ADMIN_CHAT, 50, false);
        reply.reply_text = Some("on my way".to_string());
        coordinator.process(reply).await;

        let texts = delivery.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0], (104, "on my way".to_string()));
    }

    #[tokio::test]
    async fn numbered_selector_picks_that_entry() {
        let (coordinator, _storage, delivery) = coordinator(3);

        for chat in [101, 102, 103] {
            coordinator.process(user_event(chat, 1)).await;
        }

        // #2 = second most recent.
        let mut reply = admin_event(GROUP_CHAT, 50, true);
        reply.selector = Some(2);
        reply.reply_text = Some("answering #2".to_string());
        coordinator.process(reply).await;

        assert_eq!(
            delivery.texts().last(),
            Some(&(102, "answering #2".to_string()))
        );
    }

    #[tokio::test]
    async fn explicit_link_wins_over_selector() {
        let (coordinator, storage, delivery) = coordinator(5);

        coordinator.process(user_event(401, 1)).await;
        coordinator.process(user_event(402, 1)).await;

        let mut link_to_401 = None;
        for id in 1000..1010 {
            let candidate = MessageRef::new(ChatId(ADMIN_CHAT), MessageId(id));
            if storage.get_origin(candidate).await.unwrap() == Some(ChatId(401)) {
                link_to_401 = Some(candidate);
                break;
            }
        }

        let mut reply = admin_event(ADMIN_CHAT, 50, false);
        reply.reply_link = link_to_401;
        reply.selector = Some(1); // would pick 402
        reply.reply_text = Some("for you".to_string());
        coordinator.process(reply).await;

        assert_eq!(delivery.texts().last(), Some(&(401, "for you".to_string())));
    }

    #[tokio::test]
    async fn non_admin_group_message_is_ignored_silently() {
        let (coordinator, storage, delivery) = coordinator(5);

        let event = InboundEvent::plain(
            ChatId(GROUP_CHAT),
            MessageRef::new(ChatId(GROUP_CHAT), MessageId(77)),
            Some("rando".to_string()),
            true,
        );
        coordinator.process(event).await;

        assert!(delivery.forwards().is_empty());
        assert!(delivery.copies().is_empty());
        assert!(delivery.texts().is_empty());
        assert_eq!(storage.forward_count().await, 0);
        assert_eq!(storage.seen_count().await, 0);
    }

    #[tokio::test]
    async fn dead_destination_does_not_abort_fan_out() {
        let (coordinator, storage, delivery) = coordinator(5);
        delivery.fail_dest(GROUP_CHAT);

        coordinator.process(user_event(500, 9)).await;

        let forwards = delivery.forwards();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].0, ADMIN_CHAT);
        // Only the delivered copy gets a mapping.
        assert_eq!(storage.forward_count().await, 1);
        // Partial delivery is success; the user sees no failure notice.
        assert!(delivery.texts().is_empty());
        assert_eq!(storage.seen_count().await, 1);
    }

    #[tokio::test]
    async fn total_fan_out_failure_notifies_user_and_commits_nothing() {
        let (coordinator, storage, delivery) = coordinator(5);
        delivery.fail_dest(ADMIN_CHAT);
        delivery.fail_dest(GROUP_CHAT);

        coordinator.process(user_event(500, 9)).await;

        assert!(delivery.forwards().is_empty());
        assert_eq!(storage.forward_count().await, 0);
        assert_eq!(storage.seen_count().await, 0);

        let texts = delivery.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, 500);
    }

    #[tokio::test]
    async fn concurrent_chats_are_forwarded_independently() {
        let (coordinator, storage, delivery) = coordinator(5);

        let a = coordinator.clone();
        let b = coordinator.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.process(user_event(601, 1)).await }),
            tokio::spawn(async move { b.process(user_event(602, 1)).await }),
        );
        ra.unwrap();
        rb.unwrap();

        let forwards = delivery.forwards();
        assert_eq!(forwards.len(), 4); // two chats x two destinations
        for chat in [601, 602] {
            assert_eq!(
                forwards.iter().filter(|f| f.2 == chat).count(),
                2,
                "chat {chat} must reach both destinations"
            );
        }
        assert_eq!(storage.seen_count().await, 2);
    }
}
