/// Core error type for the relay bot.
///
/// Everything here except `Config` is recoverable at the event level: the
/// offending event fails, its source chat gets a single notice, and the
/// process keeps running. Adapter crates map their transport errors into
/// `DeliveryFailed` so the core can handle failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("reply link does not resolve to a known chat")]
    UnknownReplyTarget,

    #[error("no recently active chat to reply to")]
    NoActiveChat,

    #[error("reply selector #{selector} out of range (1..={len})")]
    InvalidSelector { selector: usize, len: usize },

    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("delivery to chat {chat_id} failed: {reason}")]
    DeliveryFailed { chat_id: i64, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Plain-text notice shown to the chat whose event failed.
    pub fn notice(&self) -> String {
        match self {
            Error::UnknownReplyTarget => {
                "I don't know which user that message belongs to. \
                 Reply to a forwarded message or use #N."
                    .to_string()
            }
            Error::NoActiveChat => "Nobody to reply to yet.".to_string(),
            Error::InvalidSelector { selector, len } => {
                format!("#{selector} is out of range, the list has {len} chat(s).")
            }
            Error::StoreUnavailable(_) | Error::Io(_) | Error::Json(_) => {
                "Something broke inside the bot. Your message was not delivered.".to_string()
            }
            Error::DeliveryFailed { .. } => "Could not deliver the message.".to_string(),
            Error::Config(msg) => msg.clone(),
        }
    }
}
