use std::{
    env, fs,
    path::{Path, PathBuf},
};

use regex::Regex;

use crate::{domain::ChatId, errors::Error, Result};

const CHAT_LIST_SIZE_MIN: usize = 1;
const CHAT_LIST_SIZE_MAX: usize = 20;

/// Typed configuration for the relay bot.
///
/// Loaded from the environment (plus an optional `.env` file that never
/// overrides already-set variables). Validation happens here so the rest of
/// the core can treat every field as trusted.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Username that authenticates the administrator, without the leading `@`.
    pub admin_username: String,
    /// Admin private chat; always a forward destination.
    pub admin_chat_id: ChatId,
    /// Optional shared group that also receives forwards.
    pub group_chat_id: Option<ChatId>,
    /// Capacity of the recent-chat list (1..=20).
    pub chat_list_size: usize,
    /// Durable routing state (forward mappings + chat recency).
    pub state_file: PathBuf,
    /// Global ceiling on concurrently processed events.
    pub max_in_flight: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_username = env_str("ADMIN_USERNAME").unwrap_or_default();
        validate_admin_username(&admin_username)?;

        let admin_chat_id = env_i64("ADMIN_CHAT_ID").map(ChatId).ok_or_else(|| {
            Error::Config("ADMIN_CHAT_ID environment variable is required".to_string())
        })?;
        let group_chat_id = env_i64("GROUP_CHAT_ID").map(ChatId);

        let chat_list_size = env_usize("CHAT_LIST_SIZE").unwrap_or(5);
        validate_chat_list_size(chat_list_size)?;

        let state_file = env_path("STATE_FILE")
            .unwrap_or_else(|| PathBuf::from("/var/lib/fbot/state.json"));

        let max_in_flight = env_usize("MAX_IN_FLIGHT").unwrap_or(8).max(1);

        Ok(Self {
            telegram_bot_token,
            admin_username,
            admin_chat_id,
            group_chat_id,
            chat_list_size,
            state_file,
            max_in_flight,
        })
    }

    /// All chats that receive forwarded user messages.
    pub fn forward_destinations(&self) -> Vec<ChatId> {
        let mut out = vec![self.admin_chat_id];
        if let Some(group) = self.group_chat_id {
            out.push(group);
        }
        out
    }
}

/// Telegram usernames: 5..=32 chars, letter first, then letters/digits/underscore.
pub fn validate_admin_username(username: &str) -> Result<()> {
    let pattern = Regex::new("^[A-Za-z][A-Za-z0-9_]{4,31}$")
        .map_err(|e| Error::Config(format!("username pattern: {e}")))?;
    if !pattern.is_match(username) {
        return Err(Error::Config(format!(
            "ADMIN_USERNAME {username:?} is not a valid Telegram username"
        )));
    }
    Ok(())
}

pub fn validate_chat_list_size(size: usize) -> Result<()> {
    if !(CHAT_LIST_SIZE_MIN..=CHAT_LIST_SIZE_MAX).contains(&size) {
        return Err(Error::Config(format!(
            "CHAT_LIST_SIZE must be {CHAT_LIST_SIZE_MIN}..={CHAT_LIST_SIZE_MAX}, got {size}"
        )));
    }
    Ok(())
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}
