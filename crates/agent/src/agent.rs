//! `FoodAgent` — one conversational turn, end to end.
//!
//! ```text
//! message → context → plan → tools → envelopes → reply → memory
//! ```
//!
//! [`FoodAgent::process_message`] runs the turn and returns the reply.
//! [`FoodAgent::stream_message`] runs the same turn as a four-stage thinking
//! chain of [`ThinkingEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use serde::Serialize;
use serde_json::json;
use shihui_config::{AgentSettings, AppConfig};
use shihui_core::error::MemoryError;
use shihui_core::event::{DomainEvent, EventBus};
use shihui_core::memory::MemoryStore;
use shihui_core::message::Message;
use shihui_core::plan::Plan;
use shihui_providers::ModelRouter;
use shihui_tools::ToolRegistry;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::context_store::{ContextStore, SharedContext};
use crate::enricher::enrich;
use crate::memory_bridge::MemoryBridge;
use crate::planner::{Planner, intent_fallback};
use crate::stream_event::{Stage, ThinkingEvent, ToolReport, TurnSummary};
use crate::synthesizer::{Persona, Synthesizer};
use crate::thinking::{ChainError, ThinkingChain, gather_summary, plan_lines};

const STREAM_BUFFER: usize = 32;

/// Appended to the stored reply when streaming it failed part way.
const COMPOSE_FALLBACK: &str = "抱歉，在生成详细回答时遇到了一些问题，但工具执行结果仍然有效。";

/// One user message and where it belongs.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub user_id: String,
    pub session_id: String,
    /// Tools the user allows this turn; `None` keeps the session's setting.
    pub enabled_tools: Option<Vec<String>>,
    pub model_id: Option<String>,
    pub location: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: "default".into(),
            session_id: "default".into(),
            enabled_tools: None,
            model_id: None,
            location: None,
        }
    }

    pub fn for_session(mut self, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.session_id = session_id.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Result of a non-streamed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub response: String,
    pub tools_used: Vec<String>,
    pub memory_updated: bool,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

/// Why a streamed turn stopped early.
#[derive(Debug, Error)]
enum StreamAbort {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Context(#[from] MemoryError),
}

/// The food assistant. Cheap to clone; clones share sessions.
#[derive(Clone)]
pub struct FoodAgent {
    router: Arc<ModelRouter>,
    registry: Arc<ToolRegistry>,
    settings: AgentSettings,
    event_bus: Arc<EventBus>,
    contexts: Arc<ContextStore>,
    planner: Arc<Planner>,
    synthesizer: Arc<Synthesizer>,
    memory: Arc<MemoryBridge>,
}

impl FoodAgent {
    pub fn new(router: Arc<ModelRouter>, registry: Arc<ToolRegistry>, store: Arc<dyn MemoryStore>) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let contexts = Arc::new(ContextStore::new(store.clone()));
        let settings = AgentSettings::default();
        Self {
            planner: Arc::new(Planner::new(router.clone(), registry.clone())),
            synthesizer: Arc::new(Synthesizer::new(router.clone())),
            memory: Arc::new(MemoryBridge::new(store)),
            router,
            registry,
            settings,
            event_bus,
            contexts,
        }
        .assemble()
    }

    /// Build an agent with the configured models, tools and memory store.
    pub fn from_config(config: &AppConfig) -> shihui_core::Result<Self> {
        let router = Arc::new(shihui_providers::build_from_config(config));
        if router.is_empty() {
            warn!("No completion model configured; replies will fall back to apologies");
        }
        let event_bus = Arc::new(EventBus::default());
        let registry = shihui_tools::default_registry(config, router.clone())?.with_event_bus(event_bus.clone());
        let store = shihui_memory::build_from_config(&config.memory);

        info!(
            default_model = router.default_model(),
            tools = registry.available_tools().len(),
            memory = store.name(),
            "Food agent ready"
        );
        Ok(Self::new(router, Arc::new(registry), store)
            .with_event_bus(event_bus)
            .with_settings(config.agent.clone()))
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self.assemble()
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self.assemble()
    }

    /// Delay between streamed plan lines.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.settings.pacing_ms = pacing.as_millis() as u64;
        self
    }

    /// Rebuild the pipeline components from the current settings.
    fn assemble(mut self) -> Self {
        let settings = &self.settings;
        self.planner = Arc::new(
            Planner::new(self.router.clone(), self.registry.clone())
                .with_sampling(settings.planner_temperature, settings.planner_max_tokens)
                .with_event_bus(self.event_bus.clone()),
        );
        self.synthesizer = Arc::new(
            Synthesizer::new(self.router.clone())
                .with_persona(Persona::from_name(&settings.persona))
                .with_history_window(settings.history_window),
        );
        self.memory = Arc::new(MemoryBridge::new(self.memory.store().clone()).with_event_bus(self.event_bus.clone()));
        self
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn contexts(&self) -> &Arc<ContextStore> {
        &self.contexts
    }

    /// Run a turn and return the reply. Never fails.
    pub async fn process_message(&self, request: TurnRequest) -> TurnResponse {
        match self.run_turn(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(session_id = %request.session_id, error = %e, "Turn failed");
                TurnResponse {
                    response: format!("抱歉，处理您的请求时出现了错误：{e}"),
                    tools_used: Vec::new(),
                    memory_updated: false,
                    session_id: request.session_id,
                    plan: None,
                }
            }
        }
    }

    async fn run_turn(&self, request: &TurnRequest) -> Result<TurnResponse, MemoryError> {
        let context = self.prepare(request).await?;
        let snapshot = context.lock().await.clone();
        let model_id = request.model_id.as_deref();

        let plan = self.planner.plan(&request.message, &snapshot, model_id).await;
        let reports = self.gather(&plan, model_id).await;
        let reply = self
            .synthesizer
            .compose(&request.message, &context, &plan, &reports, model_id)
            .await;
        let memory_updated = self.memory.remember(&context, &request.message, &reply).await;

        let tools_used = self.finish_turn(&request.session_id, &reports);
        Ok(TurnResponse {
            response: reply,
            tools_used,
            memory_updated,
            session_id: request.session_id.clone(),
            plan: Some(plan),
        })
    }

    /// Fetch the session context and record the user's turn in it.
    async fn prepare(&self, request: &TurnRequest) -> Result<SharedContext, MemoryError> {
        let context = self.contexts.get_or_create(&request.user_id, &request.session_id).await?;
        {
            let mut ctx = context.lock().await;
            if let Some(tools) = &request.enabled_tools {
                ctx.set_enabled_tools(tools.iter().cloned());
            }
            if let Some(location) = &request.location {
                ctx.location = Some(location.clone());
            }
            ctx.push(Message::user(&request.message));
        }
        debug!(user_id = %request.user_id, session_id = %request.session_id, "Turn received");
        Ok(context)
    }

    /// Run the plan's tools and enrich each outcome.
    async fn gather(&self, plan: &Plan, model_id: Option<&str>) -> Vec<ToolReport> {
        if !plan.has_tools() {
            return Vec::new();
        }

        let mut plan = plan.clone();
        if let Some(id) = model_id
            && plan.tools.iter().any(|t| t == "recipe_generator")
        {
            plan.parameters
                .entry("recipe_generator".to_string())
                .or_default()
                .entry("model_id")
                .or_insert_with(|| json!(id));
        }

        self.registry
            .execute_plan(&plan)
            .await
            .into_iter()
            .map(|outcome| {
                let display = enrich(&outcome.tool_name, &outcome);
                ToolReport { outcome, display }
            })
            .collect()
    }

    fn finish_turn(&self, session_id: &str, reports: &[ToolReport]) -> Vec<String> {
        let tools_used: Vec<String> = reports.iter().map(|r| r.outcome.tool_name.clone()).collect();
        info!(session_id = %session_id, tools = ?tools_used, "Turn completed");
        self.event_bus.publish(DomainEvent::TurnCompleted {
            session_id: session_id.to_string(),
            tools_used: tools_used.clone(),
            timestamp: Utc::now(),
        });
        tools_used
    }

    /// Run a turn as a thinking chain.
    ///
    /// The pipeline runs on its own task. Dropping the receiver stops it
    /// before the next event; a panic in the pipeline arrives as an `error`
    /// event.
    pub fn stream_message(&self, request: TurnRequest) -> mpsc::Receiver<ThinkingEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let agent = self.clone();
        let supervisor = tx.clone();

        tokio::spawn(async move {
            let pipeline = tokio::spawn(async move { agent.run_stream(request, ThinkingChain::new(tx)).await });
            if let Err(e) = pipeline.await
                && e.is_panic()
            {
                error!("Streaming pipeline panicked");
                let _ = supervisor
                    .send(ThinkingEvent::Error { content: "处理请求时出现错误：内部错误".into() })
                    .await;
            }
        });

        rx
    }

    /// [`stream_message`](Self::stream_message) as a [`Stream`].
    pub fn stream(&self, request: TurnRequest) -> impl Stream<Item = ThinkingEvent> + use<> {
        ReceiverStream::new(self.stream_message(request))
    }

    async fn run_stream(&self, request: TurnRequest, mut chain: ThinkingChain) {
        match self.stream_turn(&request, &mut chain).await {
            Ok(()) => {}
            Err(StreamAbort::Chain(ChainError::Closed)) => {
                debug!(session_id = %request.session_id, "Stream receiver dropped");
            }
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e, "Streamed turn aborted");
                if !chain.state().is_terminal() {
                    let _ = chain.error(format!("处理请求时出现错误：{e}")).await;
                }
            }
        }
    }

    async fn stream_turn(&self, request: &TurnRequest, chain: &mut ThinkingChain) -> Result<(), StreamAbort> {
        chain.start("开始处理您的请求...").await?;
        let context = self.prepare(request).await?;
        let snapshot = context.lock().await.clone();
        let model_id = request.model_id.as_deref();

        // 1. Understand
        chain.processing(Stage::Understand, "正在分析您的问题...").await?;
        let analysis = self.understand(request, &snapshot, chain).await?;
        chain.completed(Stage::Understand, analysis).await?;

        // 2. Plan
        chain
            .processing(Stage::Plan, "根据需求分析，正在制定最佳的回答策略...")
            .await?;
        let plan = self.planner.plan_detailed(&request.message, &snapshot, model_id).await;
        let mut shown = String::new();
        for line in plan_lines(&plan) {
            shown.push_str(&line);
            shown.push('\n');
            chain.processing(Stage::Plan, shown.trim()).await?;
            self.pace().await;
        }
        chain.completed(Stage::Plan, shown.trim()).await?;

        // 3. Gather
        let mut reports = Vec::new();
        if plan.has_tools() {
            chain
                .processing(Stage::Gather, format!("正在使用 {} 工具收集相关信息...", plan.tools.join(", ")))
                .await?;
            reports = self.gather(&plan, model_id).await;
            chain.completed(Stage::Gather, gather_summary(&reports)).await?;
            chain.action_result(reports.clone()).await?;
        }

        // 4. Compose
        chain
            .processing(Stage::Compose, "正在整理信息，为您生成最合适的回答...")
            .await?;
        let mut fragments = self
            .synthesizer
            .compose_stream(&request.message, &context, &plan, &reports, model_id)
            .await;
        let mut reply = String::new();
        let mut failure = None;
        while let Some(fragment) = fragments.recv().await {
            match fragment {
                Ok(text) => {
                    reply.push_str(&text);
                    chain.chunk(text).await?;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            None => {
                chain
                    .completed(Stage::Compose, "回答生成完成！已为您整理好完整的信息，希望对您有帮助。")
                    .await?
            }
            Some(e) => {
                reply.push_str(COMPOSE_FALLBACK);
                chain
                    .completed(
                        Stage::Compose,
                        format!("回答生成过程中遇到问题，但我已尽力为您整理信息。错误: {e}"),
                    )
                    .await?
            }
        }

        let memory_updated = self.memory.remember(&context, &request.message, &reply).await;
        let tools_used = self.finish_turn(&request.session_id, &reports);
        chain.complete(TurnSummary { memory_updated, tools_used }).await?;
        Ok(())
    }

    /// Stream the intent analysis into stage 1; returns the final text.
    async fn understand(
        &self,
        request: &TurnRequest,
        snapshot: &shihui_core::context::ConversationContext,
        chain: &mut ThinkingChain,
    ) -> Result<String, ChainError> {
        let mut analysis = String::new();
        match self
            .planner
            .analyze_intent(&request.message, snapshot, request.model_id.as_deref())
            .await
        {
            Ok(mut chunks) => {
                while let Some(chunk) = chunks.recv().await {
                    match chunk {
                        Ok(chunk) => {
                            let Some(text) = chunk.content.filter(|t| !t.is_empty()) else { continue };
                            analysis.push_str(&text);
                            chain.processing(Stage::Understand, analysis.clone()).await?;
                        }
                        Err(e) => {
                            warn!(error = %e, "Intent analysis interrupted");
                            analysis.clear();
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "Intent analysis unavailable"),
        }

        if analysis.trim().is_empty() {
            analysis = intent_fallback(&request.message);
        }
        Ok(analysis)
    }

    async fn pace(&self) {
        if self.settings.pacing_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.pacing_ms)).await;
        }
    }
}
