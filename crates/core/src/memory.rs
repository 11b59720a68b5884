//! Memory trait — long-term per-user storage.
//!
//! The assistant forwards conversation records and preference snapshots to a
//! memory collaborator and reads them back to seed new sessions. Persistence
//! internals live behind this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::MemoryError;

/// Record kind used for turn transcripts.
pub const KIND_CONVERSATION: &str = "conversation";

/// Record kind used for explicit preference snapshots.
pub const KIND_PREFERENCE: &str = "preference";

/// A single stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub user_id: String,

    /// Record kind (`conversation`, `preference`, ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque structured content
    pub content: serde_json::Value,

    pub timestamp: DateTime<Utc>,

    /// Set by search operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryRecord {
    pub fn new(user_id: impl Into<String>, kind: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind: kind.into(),
            content,
            timestamp: Utc::now(),
            relevance_score: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Preferences carried by this record, if any.
    ///
    /// `preference` records store them as the whole content; conversation
    /// records may carry a `preferences` field.
    pub fn preferences(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        if self.kind == KIND_PREFERENCE {
            return self.content.as_object();
        }
        self.content.get("preferences").and_then(|p| p.as_object())
    }
}

/// The memory collaborator.
///
/// Implementations: in-process store, HTTP memory service client.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "openmemory").
    fn name(&self) -> &str;

    /// Store a record; returns its id.
    async fn add_memory(&self, record: MemoryRecord) -> std::result::Result<String, MemoryError>;

    /// Most recent records for a user, newest first.
    async fn get_user_memories(&self, user_id: &str, limit: usize) -> std::result::Result<Vec<MemoryRecord>, MemoryError>;

    /// Records relevant to `query`, best first.
    async fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryRecord>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_kind_as_type() {
        let record = MemoryRecord::new("u1", KIND_CONVERSATION, json!({"user_message": "hi"}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "conversation");
        assert!(value.get("relevance_score").is_none());
    }

    #[test]
    fn preferences_from_both_kinds() {
        let pref = MemoryRecord::new("u1", KIND_PREFERENCE, json!({"spicy_preference": "high"}));
        assert_eq!(pref.preferences().unwrap()["spicy_preference"], "high");

        let conv = MemoryRecord::new(
            "u1",
            KIND_CONVERSATION,
            json!({"user_message": "素食", "preferences": {"diet_type": "vegetarian"}}),
        );
        assert_eq!(conv.preferences().unwrap()["diet_type"], "vegetarian");

        let bare = MemoryRecord::new("u1", KIND_CONVERSATION, json!({"user_message": "hi"}));
        assert!(bare.preferences().is_none());
    }
}
