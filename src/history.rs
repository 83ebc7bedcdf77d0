// history.rs - Per-User Chat History
// In-memory conversation store used by /chat and /clearhistory.
// Lives for the lifetime of the process; nothing is written to disk.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Default)]
pub struct HistoryService {
    histories: RwLock<HashMap<UserId, Vec<ChatMessage>>>,
}

impl HistoryService {
    pub fn new() -> Self {
        log::info!("[HISTORY] History service initialized");
        Self::default()
    }

    /// Snapshot of a user's history, empty for unknown users
    pub async fn get_user_history(&self, user_id: UserId) -> Vec<ChatMessage> {
        self.histories
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn add_message(&self, user_id: UserId, message: ChatMessage) {
        self.add_messages(user_id, vec![message]).await;
    }

    /// Append several messages under one write lock so readers never see a partial turn
    pub async fn add_messages(&self, user_id: UserId, messages: Vec<ChatMessage>) {
        self.histories
            .write()
            .await
            .entry(user_id)
            .or_default()
            .extend(messages);
    }

    pub async fn clear_history(&self, user_id: UserId) {
        self.histories.write().await.remove(&user_id);
        log::info!("[HISTORY] Cleared history for user {}", user_id);
    }

    pub async fn has_history(&self, user_id: UserId) -> bool {
        self.histories
            .read()
            .await
            .get(&user_id)
            .map_or(false, |history| !history.is_empty())
    }
}
