//! Per-session conversation state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Default number of recent messages handed to the model.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Mutable record for one (user, session) pair.
///
/// History is append-only and unbounded; readers take a window of the most
/// recent messages. Preferences are merged, never replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub preferences: serde_json::Map<String, serde_json::Value>,

    /// Tools allowed for the current turn; empty means all registered tools.
    pub enabled_tools: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            messages: Vec::new(),
            preferences: serde_json::Map::new(),
            enabled_tools: BTreeSet::new(),
            location: None,
            created_at: Utc::now(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The most recent `k` messages, oldest first.
    pub fn recent(&self, k: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(k);
        &self.messages[start..]
    }

    /// Merge `prefs` key by key; later values win.
    pub fn merge_preferences(&mut self, prefs: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in prefs {
            self.preferences.insert(key, value);
        }
    }

    pub fn set_enabled_tools<I, S>(&mut self, tools: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = tools.into_iter().map(Into::into).collect();
    }
}
