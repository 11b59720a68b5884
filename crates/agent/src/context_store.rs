//! Per-(user, session) conversation contexts.
//!
//! Contexts are created on first use and seeded with the preferences the
//! memory store holds for the user. They live for the lifetime of the
//! process.

use std::collections::HashMap;
use std::sync::Arc;

use shihui_core::context::ConversationContext;
use shihui_core::error::MemoryError;
use shihui_core::memory::{KIND_PREFERENCE, MemoryStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A context shared between the stages of a turn.
pub type SharedContext = Arc<Mutex<ConversationContext>>;

/// How many stored records are read when seeding a new context.
const SEED_LIMIT: usize = 100;

pub struct ContextStore {
    memory: Arc<dyn MemoryStore>,
    contexts: Mutex<HashMap<(String, String), SharedContext>>,
}

impl ContextStore {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            memory,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Return the context for `(user_id, session_id)`, creating and seeding
    /// it on first use.
    ///
    /// The map lock is not held while the memory store is queried; if two
    /// turns race to create the same context, the first one stored wins.
    pub async fn get_or_create(&self, user_id: &str, session_id: &str) -> Result<SharedContext, MemoryError> {
        let key = (user_id.to_string(), session_id.to_string());
        if let Some(existing) = self.contexts.lock().await.get(&key) {
            return Ok(existing.clone());
        }

        let seeded = self.seed(user_id, session_id).await?;
        let mut contexts = self.contexts.lock().await;
        let context = contexts
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(seeded)))
            .clone();
        Ok(context)
    }

    async fn seed(&self, user_id: &str, session_id: &str) -> Result<ConversationContext, MemoryError> {
        let mut context = ConversationContext::new(user_id, session_id);
        let mut records = self.memory.get_user_memories(user_id, SEED_LIMIT).await?;

        // Only explicit preference records; oldest first, so newer ones win.
        records.retain(|r| r.kind == KIND_PREFERENCE);
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        for record in &records {
            if let Some(prefs) = record.preferences() {
                context.merge_preferences(prefs.clone());
            }
        }

        info!(
            user_id,
            session_id,
            records = records.len(),
            preferences = context.preferences.len(),
            "Created conversation context"
        );
        Ok(context)
    }

    /// Whether a context exists for the pair.
    pub async fn contains(&self, user_id: &str, session_id: &str) -> bool {
        let key = (user_id.to_string(), session_id.to_string());
        self.contexts.lock().await.contains_key(&key)
    }

    /// Number of live contexts.
    pub async fn len(&self) -> usize {
        let n = self.contexts.lock().await.len();
        debug!(contexts = n, "Context count");
        n
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FailingMemory;
    use serde_json::json;
    use shihui_core::memory::{KIND_CONVERSATION, KIND_PREFERENCE, MemoryRecord};
    use shihui_memory::InMemoryStore;

    #[tokio::test]
    async fn creates_once_per_pair() {
        let store = ContextStore::new(Arc::new(InMemoryStore::new()));
        let a = store.get_or_create("u1", "s1").await.unwrap();
        a.lock().await.location = Some("长沙".into());

        let again = store.get_or_create("u1", "s1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(again.lock().await.location.as_deref(), Some("长沙"));

        let other = store.get_or_create("u1", "s2").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn seeds_from_preference_records_only() {
        let memory = Arc::new(InMemoryStore::new());
        let mut old = MemoryRecord::new("u1", KIND_PREFERENCE, json!({"spicy_preference": "low", "diet_type": "vegetarian"}));
        old.timestamp -= chrono::Duration::minutes(5);
        memory.add_memory(old).await.unwrap();
        memory
            .add_memory(MemoryRecord::new("u1", KIND_PREFERENCE, json!({"spicy_preference": "medium"})))
            .await
            .unwrap();
        memory
            .add_memory(MemoryRecord::new(
                "u1",
                KIND_CONVERSATION,
                json!({"user_message": "我爱吃辣", "preferences": {"spicy_preference": "high", "health_goal": "weight_loss"}}),
            ))
            .await
            .unwrap();

        let store = ContextStore::new(memory);
        let ctx = store.get_or_create("u1", "s1").await.unwrap();
        let ctx = ctx.lock().await;
        assert_eq!(ctx.preferences["spicy_preference"], "medium");
        assert_eq!(ctx.preferences["diet_type"], "vegetarian");
        assert!(!ctx.preferences.contains_key("health_goal"));
        assert!(ctx.messages.is_empty());
    }

    #[tokio::test]
    async fn seeding_failure_propagates_and_stores_nothing() {
        let store = ContextStore::new(Arc::new(FailingMemory));
        assert!(store.get_or_create("u1", "s1").await.is_err());
        assert!(!store.contains("u1", "s1").await);
        assert!(store.is_empty().await);
    }
}
