//! Shared test doubles for the orchestration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use shihui_core::error::{MemoryError, ProviderError, ToolError};
use shihui_core::memory::{MemoryRecord, MemoryStore};
use shihui_core::message::Message;
use shihui_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};
use shihui_providers::ModelRouter;
use shihui_tools::ToolRegistry;

/// Characters per chunk when a scripted reply is streamed.
const CHUNK_CHARS: usize = 4;

/// A provider that returns scripted replies in order.
///
/// Once the script is exhausted every call fails with `EmptyResponse`.
/// Requests are recorded for inspection.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::EmptyResponse("scripted".into())))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let text = self.next(request)?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model: "mock-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let text = self.next(request)?;
        let chars: Vec<char> = text.chars().collect();
        let (tx, rx) = tokio::sync::mpsc::channel(chars.len() / CHUNK_CHARS + 2);
        for piece in chars.chunks(CHUNK_CHARS) {
            let _ = tx.try_send(Ok(StreamChunk {
                content: Some(piece.iter().collect()),
                done: false,
                usage: None,
            }));
        }
        let _ = tx.try_send(Ok(StreamChunk { content: None, done: true, usage: None }));
        Ok(rx)
    }
}

/// A provider whose every call fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError { status_code: 503, message: "service unavailable".into() })
    }
}

/// A provider whose streams break after the first chunk.
pub struct BrokenStreamProvider;

#[async_trait]
impl Provider for BrokenStreamProvider {
    fn name(&self) -> &str {
        "broken_stream"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection reset".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx.try_send(Ok(StreamChunk { content: Some("好的，".into()), done: false, usage: None }));
        let _ = tx.try_send(Err(ProviderError::StreamInterrupted("connection reset".into())));
        Ok(rx)
    }
}

pub fn router(provider: Arc<dyn Provider>) -> Arc<ModelRouter> {
    Arc::new(ModelRouter::single("mock", provider, "mock-model"))
}

/// A tool that returns a fixed payload (or error) and counts calls.
pub struct StaticTool {
    name: &'static str,
    category: ToolCategory,
    required: Vec<&'static str>,
    reply: Result<Value, String>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticTool {
    pub fn ok(name: &'static str, category: ToolCategory, payload: Value) -> Self {
        Self {
            name,
            category,
            required: Vec::new(),
            reply: Ok(payload),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &'static str, reason: &str) -> Self {
        Self {
            name,
            category: ToolCategory::General,
            required: Vec::new(),
            reply: Err(reason.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn requiring(mut self, param: &'static str) -> Self {
        self.required.push(param);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "scripted tool"
    }

    fn parameters(&self) -> ParameterSchema {
        self.required
            .iter()
            .fold(ParameterSchema::new(), |schema, p| schema.required(p, ParamKind::String, p))
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    async fn execute(&self, _params: &ToolParams) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(|reason| ToolError::failed(self.name, reason))
    }
}

pub fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    Arc::new(registry)
}

/// A memory store that is always down.
pub struct FailingMemory;

#[async_trait]
impl MemoryStore for FailingMemory {
    fn name(&self) -> &str {
        "failing"
    }

    async fn add_memory(&self, _record: MemoryRecord) -> Result<String, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn get_user_memories(&self, _user_id: &str, _limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn search_memories(&self, _user_id: &str, _query: &str, _limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }
}
