//! Memory store implementations for Shihui.

pub mod noop;
pub mod in_memory;
pub mod openmemory;

pub use noop::NoopMemory;
pub use in_memory::InMemoryStore;
pub use openmemory::OpenMemoryClient;

use std::sync::Arc;
use shihui_core::memory::MemoryStore;

/// Build the configured memory store.
pub fn build_from_config(config: &shihui_config::MemoryConfig) -> Arc<dyn MemoryStore> {
    match config.backend.as_str() {
        "openmemory" => Arc::new(OpenMemoryClient::new(
            &config.base_url,
            config.api_key.clone(),
            config.max_memories,
        )),
        "none" => Arc::new(NoopMemory),
        _ => Arc::new(InMemoryStore::with_capacity(config.max_memories)),
    }
}
