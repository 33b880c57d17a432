use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    storage::port::Storage,
    Result,
};

/// On-disk layout. Keys are strings because JSON objects require them:
/// forwards are keyed `"{chat_id}:{message_id}"`, recency by the chat id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    forwards: HashMap<String, i64>,
    #[serde(default)]
    last_seen: HashMap<String, DateTime<Utc>>,
}

/// Durable store backed by a single JSON file.
///
/// All mutation happens under one mutex, and every write goes to a temp
/// file followed by a rename, so the state file is always either the old
/// or the new version. Suits the deployment size this bot targets (one
/// admin, a bounded recent-chat list).
pub struct JsonFileStorage {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl JsonFileStorage {
    /// Load existing state or start empty. A present-but-corrupt file is an
    /// error: silently discarding routing state would strand conversations.
    pub fn open(path: &Path) -> Result<Self> {
        let state = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(e) => return Err(Error::StoreUnavailable(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &StateFile) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", parent.display())))?;
        }
        fs::write(&tmp, json)
            .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}

fn forward_key(msg: MessageRef) -> String {
    format!("{}:{}", msg.chat_id.0, msg.message_id.0)
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn put_forward_mapping(&self, forwarded: MessageRef, origin: ChatId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.forwards.insert(forward_key(forwarded), origin.0);
        self.persist(&state)
    }

    async fn get_origin(&self, forwarded: MessageRef) -> Result<Option<ChatId>> {
        let state = self.state.lock().await;
        Ok(state.forwards.get(&forward_key(forwarded)).map(|&id| ChatId(id)))
    }

    async fn record_chat_seen(&self, chat: ChatId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.last_seen.insert(chat.0.to_string(), at);
        self.persist(&state)
    }

    async fn list_recent_chats(&self, limit: usize) -> Result<Vec<ChatId>> {
        let state = self.state.lock().await;
        let mut seen: Vec<(i64, DateTime<Utc>)> = state
            .last_seen
            .iter()
            .filter_map(|(k, &at)| k.parse::<i64>().ok().map(|id| (id, at)))
            .collect();
        seen.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(seen.into_iter().take(limit).map(|(id, _)| ChatId(id)).collect())
    }
}
