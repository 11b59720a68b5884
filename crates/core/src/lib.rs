//! # Shihui Core
//!
//! Domain types, traits, and error definitions for the Shihui food assistant.
//! Every collaborator the orchestration pipeline talks to (completion
//! providers, tools, the memory store) is a trait here; implementations live
//! in their own crates.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod plan;
pub mod context;
pub mod display;
pub mod memory;
pub mod event;
pub mod json;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{
    ParamKind, ParameterSchema, ParameterSpec, Tool, ToolCategory, ToolMetadata, ToolOutcome,
    ToolParams,
};
pub use plan::{Plan, ResponseType};
pub use context::{ConversationContext, DEFAULT_HISTORY_WINDOW};
pub use display::{DisplayEnvelope, DisplayType};
pub use memory::{MemoryRecord, MemoryStore, KIND_CONVERSATION, KIND_PREFERENCE};
pub use event::{DomainEvent, EventBus};
