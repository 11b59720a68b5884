//! In-memory store — per-user record lists, capped, with keyword search.
//!
//! Serves both as the standalone backend and as the local cache behind the
//! HTTP memory client.

use async_trait::async_trait;
use shihui_core::error::MemoryError;
use shihui_core::memory::{MemoryRecord, MemoryStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of records kept per user.
pub const DEFAULT_MAX_PER_USER: usize = 100;

pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<String, Vec<MemoryRecord>>>>,
    max_per_user: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_PER_USER)
    }

    /// Keep at most `max_per_user` records per user; oldest are dropped first.
    pub fn with_capacity(max_per_user: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            max_per_user: max_per_user.max(1),
        }
    }

    /// Number of records held for a user.
    pub async fn count(&self, user_id: &str) -> usize {
        self.records.read().await.get(user_id).map_or(0, Vec::len)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyword relevance: +1 for the whole query, +0.5 per whitespace-separated word.
pub(crate) fn relevance(record: &MemoryRecord, query: &str) -> f32 {
    let haystack = record.content.to_string().to_lowercase();
    let query = query.to_lowercase();
    let mut score = 0.0;
    if !query.is_empty() && haystack.contains(&query) {
        score += 1.0;
    }
    for word in query.split_whitespace() {
        if haystack.contains(word) {
            score += 0.5;
        }
    }
    score
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn add_memory(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        let id = record.id.clone();
        let mut records = self.records.write().await;
        let list = records.entry(record.user_id.clone()).or_default();
        list.push(record);
        if list.len() > self.max_per_user {
            let excess = list.len() - self.max_per_user;
            list.drain(..excess);
        }
        Ok(id)
    }

    async fn get_user_memories(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.records.read().await;
        let mut list: Vec<MemoryRecord> = records.get(user_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list.truncate(limit);
        Ok(list)
    }

    async fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.records.read().await;
        let Some(list) = records.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<MemoryRecord> = list
            .iter()
            .filter_map(|r| {
                let score = relevance(r, query);
                (score > 0.0).then(|| {
                    let mut r = r.clone();
                    r.relevance_score = Some(score);
                    r
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shihui_core::memory::{KIND_CONVERSATION, KIND_PREFERENCE};

    fn conversation(user: &str, text: &str) -> MemoryRecord {
        MemoryRecord::new(user, KIND_CONVERSATION, json!({ "user_message": text }))
    }

    #[tokio::test]
    async fn add_and_list_newest_first() {
        let mem = InMemoryStore::new();
        let mut older = conversation("u1", "第一条");
        older.timestamp -= chrono::Duration::seconds(10);
        mem.add_memory(older).await.unwrap();
        mem.add_memory(conversation("u1", "第二条")).await.unwrap();
        mem.add_memory(conversation("u2", "别人的")).await.unwrap();

        let list = mem.get_user_memories("u1", 10).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].content["user_message"], "第二条");
    }

    #[tokio::test]
    async fn per_user_cap_drops_oldest() {
        let mem = InMemoryStore::with_capacity(3);
        for i in 0..5 {
            mem.add_memory(conversation("u1", &format!("m{i}"))).await.unwrap();
        }
        assert_eq!(mem.count("u1").await, 3);
        let all = mem.get_user_memories("u1", 10).await.unwrap();
        assert!(all.iter().all(|r| r.content["user_message"] != "m0"));
    }

    #[tokio::test]
    async fn search_scores_and_orders() {
        let mem = InMemoryStore::new();
        mem.add_memory(conversation("u1", "我喜欢 川菜 和 火锅")).await.unwrap();
        mem.add_memory(conversation("u1", "今天吃 火锅")).await.unwrap();
        mem.add_memory(MemoryRecord::new("u1", KIND_PREFERENCE, json!({"diet_type": "vegetarian"})))
            .await
            .unwrap();

        let results = mem.search_memories("u1", "川菜 火锅", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content["user_message"], "我喜欢 川菜 和 火锅");
        assert!(results[0].relevance_score.unwrap() > results[1].relevance_score.unwrap());

        assert!(mem.search_memories("nobody", "火锅", 10).await.unwrap().is_empty());
    }
}
