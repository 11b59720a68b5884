//! No-op memory store — disables long-term memory entirely.

use async_trait::async_trait;
use shihui_core::error::MemoryError;
use shihui_core::memory::{MemoryRecord, MemoryStore};

/// A memory store that keeps nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryStore for NoopMemory {
    fn name(&self) -> &str { "none" }

    async fn add_memory(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        Ok(record.id)
    }

    async fn get_user_memories(&self, _user_id: &str, _limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(Vec::new())
    }

    async fn search_memories(&self, _user_id: &str, _query: &str, _limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(Vec::new())
    }
}
