//! Memory bridge — learns preferences from a turn and persists the turn.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use shihui_core::event::{DomainEvent, EventBus};
use shihui_core::memory::{KIND_CONVERSATION, MemoryRecord, MemoryStore};
use tracing::{debug, warn};

use crate::context_store::SharedContext;

type Rule = (&'static [&'static str], &'static str, &'static str);

/// Groups of `(keywords, key, value)`; within a group the first matching
/// row wins.
///
/// "不辣" contains "辣", so the mild row is checked first. A vegetarian
/// diet takes precedence over a weight-loss goal.
const PREFERENCE_RULES: &[&[Rule]] = &[
    &[
        (&["清淡", "不辣"], "spicy_preference", "low"),
        (&["麻辣", "辣", "川菜"], "spicy_preference", "high"),
    ],
    &[
        (&["素食", "vegetarian"], "diet_type", "vegetarian"),
        (&["减肥", "低热量"], "health_goal", "weight_loss"),
    ],
];

/// Preferences stated in a message.
pub fn extract_preferences(message: &str) -> Map<String, Value> {
    let lower = message.to_lowercase();
    let mut prefs = Map::new();
    for group in PREFERENCE_RULES {
        let hit = group
            .iter()
            .find(|(keywords, _, _)| keywords.iter().any(|k| lower.contains(k)));
        if let Some((_, key, value)) = hit {
            prefs.insert(key.to_string(), json!(value));
        }
    }
    prefs
}

pub struct MemoryBridge {
    store: Arc<dyn MemoryStore>,
    event_bus: Option<Arc<EventBus>>,
}

impl MemoryBridge {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store, event_bus: None }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Merge learned preferences into the context, then store the turn.
    ///
    /// Returns whether the store accepted the record. The merge is kept
    /// either way.
    pub async fn remember(&self, context: &SharedContext, user_message: &str, reply: &str) -> bool {
        let prefs = extract_preferences(user_message);
        let (user_id, session_id) = {
            let mut ctx = context.lock().await;
            if !prefs.is_empty() {
                debug!(preferences = ?prefs, "Learned preferences");
                ctx.merge_preferences(prefs.clone());
            }
            (ctx.user_id.clone(), ctx.session_id.clone())
        };

        let mut content = json!({
            "type": KIND_CONVERSATION,
            "timestamp": Utc::now().to_rfc3339(),
            "user_message": user_message,
            "ai_response": reply,
            "session_id": session_id,
        });
        if !prefs.is_empty() {
            content["preferences"] = Value::Object(prefs);
        }

        let stored = match self
            .store
            .add_memory(MemoryRecord::new(&user_id, KIND_CONVERSATION, content))
            .await
        {
            Ok(id) => {
                debug!(user_id = %user_id, id = %id, backend = self.store.name(), "Turn stored");
                true
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to store turn");
                false
            }
        };

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::MemoryStored {
                user_id,
                success: stored,
                timestamp: Utc::now(),
            });
        }
        stored
    }
}
