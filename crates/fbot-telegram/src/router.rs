use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::Message};
use tracing::{debug, info};

use fbot_core::{
    config::Config,
    dispatch::Coordinator,
    domain::{ChatId, MessageId, MessageRef},
    ledger::RecentChats,
    messaging::{Delivery, InboundEvent},
    routing::Resolver,
    storage::Storage,
};

use crate::TelegramDelivery;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub coordinator: Arc<Coordinator>,
}

/// Long-poll Telegram until shutdown, feeding every message through the
/// dispatch coordinator.
pub async fn run_polling(cfg: Arc<Config>, storage: Arc<dyn Storage>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!(
            username = me.username(),
            destinations = cfg.forward_destinations().len(),
            "feedback bot started"
        );
    }

    // Quick-reply should survive restarts.
    let ledger = RecentChats::rebuild(storage.as_ref(), cfg.chat_list_size).await?;
    info!(restored = ledger.len(), "recent-chat ledger rebuilt from store");

    let delivery: Arc<dyn Delivery> = Arc::new(TelegramDelivery::new(bot.clone()));
    let resolver = Resolver::new(cfg.admin_username.clone(), cfg.forward_destinations());
    let coordinator = Arc::new(Coordinator::new(
        resolver,
        storage,
        delivery,
        ledger,
        cfg.max_in_flight,
    ));

    let state = Arc::new(AppState { cfg, coordinator });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(event) = inbound_event(&msg) else {
        return Ok(());
    };
    state.coordinator.process(event).await;
    Ok(())
}

/// Map a Telegram message into the core inbound model. Returns `None` for
/// events the routing core never sees: senderless service messages and bot
/// commands (command UX is outside the routing core).
fn inbound_event(msg: &Message) -> Option<InboundEvent> {
    let from = msg.from()?;
    let text = msg.text();

    if text.map(|t| t.starts_with('/')).unwrap_or(false) {
        debug!(chat = msg.chat.id.0, "skipping bot command");
        return None;
    }

    let source_chat = ChatId(msg.chat.id.0);
    let mut event = InboundEvent::plain(
        source_chat,
        MessageRef::new(source_chat, MessageId(msg.id.0)),
        from.username.clone(),
        !msg.chat.is_private(),
    );

    // A reply-link points at a message in the same chat.
    event.reply_link = msg
        .reply_to_message()
        .map(|r| MessageRef::new(source_chat, MessageId(r.id.0)));

    if let Some((selector, body)) = text.and_then(parse_selector) {
        event.selector = Some(selector);
        event.reply_text = Some(body);
    }

    Some(event)
}

/// Parse a leading quick-reply token: `#N body` -> `(N, body)`.
///
/// N is 1-based with at most two digits (the ledger holds at most 20
/// entries). A bare `#N` with no body, `#0`, or `#2x` is ordinary text.
fn parse_selector(text: &str) -> Option<(usize, String)> {
    let rest = text.strip_prefix('#')?;
    let split = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, tail) = rest.split_at(split);

    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let selector: usize = digits.parse().ok()?;
    if selector == 0 {
        return None;
    }
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let body = tail.trim_start();
    if body.is_empty() {
        return None;
    }
    Some((selector, body.to_string()))
}
