//! HTTP client for an OpenMemory-style service, backed by a local cache.
//!
//! Every write lands in the local cache; the remote call is best effort.
//! Reads prefer the service and fall back to the cache when it is
//! unreachable or answers with anything other than JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shihui_core::error::MemoryError;
use shihui_core::memory::{MemoryRecord, MemoryStore};
use tracing::{debug, info, warn};

use crate::in_memory::InMemoryStore;

pub struct OpenMemoryClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    cache: InMemoryStore,
}

impl OpenMemoryClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, max_per_user: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            cache: InMemoryStore::with_capacity(max_per_user),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post_record(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let payload = serde_json::json!({
            "user_id": record.user_id,
            "content": record.content,
            "type": record.kind,
            "timestamp": record.timestamp.to_rfc3339(),
            "metadata": record.metadata,
        });

        let response = self
            .authorized(self.client.post(format!("{}/memories", self.base_url)))
            .json(&payload)
            .send()
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryError::Storage(format!("HTTP {}", response.status())));
        }
        Ok(())
    }

    async fn fetch_records(&self, builder: reqwest::RequestBuilder, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryError::QueryFailed(format!("HTTP {}", response.status())));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_lowercase().contains("application/json"));
        if !is_json {
            return Err(MemoryError::QueryFailed("non-JSON response".into()));
        }

        let items: Vec<ApiMemory> = response
            .json()
            .await
            .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;
        Ok(items.into_iter().map(|m| m.into_record(user_id)).collect())
    }
}

#[async_trait]
impl MemoryStore for OpenMemoryClient {
    fn name(&self) -> &str { "openmemory" }

    async fn add_memory(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        record
            .metadata
            .entry("created_by")
            .or_insert_with(|| serde_json::json!("food_agent"));

        match self.post_record(&record).await {
            Ok(()) => info!(user_id = %record.user_id, id = %record.id, "Stored memory remotely"),
            Err(e) => warn!(user_id = %record.user_id, error = %e, "Remote memory write failed, keeping local copy"),
        }
        self.cache.add_memory(record).await
    }

    async fn get_user_memories(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        let request = self
            .client
            .get(format!("{}/memories", self.base_url))
            .query(&[("user_id", user_id), ("limit", &limit.to_string())]);

        match self.fetch_records(request, user_id).await {
            Ok(records) if !records.is_empty() => Ok(records),
            Ok(_) => self.cache.get_user_memories(user_id, limit).await,
            Err(e) => {
                debug!(user_id, error = %e, "Remote memory read failed, using local cache");
                self.cache.get_user_memories(user_id, limit).await
            }
        }
    }

    async fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let request = self
            .client
            .post(format!("{}/memories/search", self.base_url))
            .json(&serde_json::json!({ "user_id": user_id, "query": query, "limit": limit }));

        match self.fetch_records(request, user_id).await {
            Ok(records) if !records.is_empty() => Ok(records),
            Ok(_) => self.cache.search_memories(user_id, query, limit).await,
            Err(e) => {
                debug!(user_id, error = %e, "Remote memory search failed, using local cache");
                self.cache.search_memories(user_id, query, limit).await
            }
        }
    }
}

/// Lenient shape of a record returned by the service.
#[derive(Debug, Deserialize)]
struct ApiMemory {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    relevance_score: Option<f32>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl ApiMemory {
    fn into_record(self, user_id: &str) -> MemoryRecord {
        let mut record = MemoryRecord::new(
            self.user_id.unwrap_or_else(|| user_id.to_string()),
            self.kind.unwrap_or_else(|| "conversation".to_string()),
            self.content,
        );
        if let Some(id) = self.id {
            record.id = id;
        }
        if let Some(ts) = self.timestamp {
            record.timestamp = ts;
        }
        record.relevance_score = self.relevance_score;
        record.metadata = self.metadata;
        record
    }
}
