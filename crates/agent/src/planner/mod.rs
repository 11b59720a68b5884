//! Planner — decides which tools a turn needs.
//!
//! The model is asked for a JSON plan first. Anything short of a well-formed
//! plan (transport error, empty reply, prose, an unknown response type)
//! sends the turn to the keyword rule engine, which always answers.

pub mod prompt;
pub mod query;
pub mod rules;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shihui_config::AgentSettings;
use shihui_core::context::ConversationContext;
use shihui_core::error::ProviderError;
use shihui_core::event::{DomainEvent, EventBus};
use shihui_core::json::extract_object;
use shihui_core::message::Message;
use shihui_core::plan::Plan;
use shihui_core::provider::{ChunkReceiver, ProviderRequest};
use shihui_providers::ModelRouter;
use shihui_tools::ToolRegistry;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use prompt::intent_fallback;
pub use query::image_query;
pub use rules::{Intent, classify, fallback_plan};

const INTENT_TEMPERATURE: f32 = 0.7;
const INTENT_MAX_TOKENS: u32 = 800;

const FALLBACK_STRATEGY: &str = "使用备用策略回答用户问题";
const MALFORMED_REASONING: &str = "AI模型返回格式错误，使用规则引擎";

/// Why the model's plan was not used.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("{0}")]
    Completion(#[from] ProviderError),

    #[error("no completion model configured")]
    NoModel,

    #[error("malformed plan: {0}")]
    Malformed(String),
}

pub struct Planner {
    router: Arc<ModelRouter>,
    registry: Arc<ToolRegistry>,
    temperature: f32,
    max_tokens: u32,
    event_bus: Option<Arc<EventBus>>,
}

impl Planner {
    pub fn new(router: Arc<ModelRouter>, registry: Arc<ToolRegistry>) -> Self {
        let defaults = AgentSettings::default();
        Self {
            router,
            registry,
            temperature: defaults.planner_temperature,
            max_tokens: defaults.planner_max_tokens,
            event_bus: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Plan a turn. Never fails.
    pub async fn plan(&self, message: &str, context: &ConversationContext, model_id: Option<&str>) -> Plan {
        match self.model_plan(message, context, model_id, false).await {
            Ok(plan) => self.finish(plan, context, false),
            Err(e) => {
                warn!(error = %e, "Planning fell back to rules");
                self.finish(fallback_plan(message), context, true)
            }
        }
    }

    /// Plan a turn with `strategy` and `reasoning` filled in. Never fails.
    pub async fn plan_detailed(&self, message: &str, context: &ConversationContext, model_id: Option<&str>) -> Plan {
        match self.model_plan(message, context, model_id, true).await {
            Ok(plan) => self.finish(plan, context, false),
            Err(e) => {
                warn!(error = %e, "Detailed planning fell back to rules");
                let mut plan = fallback_plan(message);
                plan.strategy = Some(FALLBACK_STRATEGY.to_string());
                plan.reasoning = Some(match e {
                    PlanningError::Malformed(_) => MALFORMED_REASONING.to_string(),
                    other => format!("AI调用失败：{other}"),
                });
                self.finish(plan, context, true)
            }
        }
    }

    /// Start a streamed analysis of what the user is asking for.
    ///
    /// Callers show [`intent_fallback`] when this fails.
    pub async fn analyze_intent(
        &self,
        message: &str,
        context: &ConversationContext,
        model_id: Option<&str>,
    ) -> Result<ChunkReceiver, PlanningError> {
        let route = self.router.resolve(model_id).ok_or(PlanningError::NoModel)?;
        let request = ProviderRequest::new(
            &route.model,
            vec![Message::system(prompt::intent_prompt(message, context)), Message::user(message)],
        )
        .with_temperature(INTENT_TEMPERATURE)
        .with_max_tokens(INTENT_MAX_TOKENS)
        .streaming();
        Ok(route.provider.stream(request).await?)
    }

    async fn model_plan(
        &self,
        message: &str,
        context: &ConversationContext,
        model_id: Option<&str>,
        detailed: bool,
    ) -> Result<Plan, PlanningError> {
        let route = self.router.resolve(model_id).ok_or(PlanningError::NoModel)?;
        let tools = self.registry.enabled_metadata(&context.enabled_tools);
        let request = ProviderRequest::new(
            &route.model,
            vec![
                Message::system(prompt::planning_prompt(message, context, &tools, detailed)),
                Message::user(message),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let reply = route.provider.complete(request).await?.message.content;
        if reply.trim().is_empty() {
            return Err(ProviderError::EmptyResponse(route.id.clone()).into());
        }
        debug!(reply = %reply, "Planner reply");
        parse_plan(&reply)
    }

    fn finish(&self, mut plan: Plan, context: &ConversationContext, fallback: bool) -> Plan {
        plan.retain_enabled(&context.enabled_tools);
        info!(
            session_id = %context.session_id,
            intent = %plan.intent,
            tools = ?plan.tools,
            response_type = plan.response_type.as_str(),
            fallback,
            "Plan ready"
        );
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::PlanCreated {
                session_id: context.session_id.clone(),
                tools: plan.tools.clone(),
                fallback,
                timestamp: Utc::now(),
            });
        }
        plan
    }
}

/// Read a plan from a model reply, tolerating prose or fences around it.
pub fn parse_plan(reply: &str) -> Result<Plan, PlanningError> {
    let object = extract_object(reply).ok_or_else(|| PlanningError::Malformed("no JSON object".into()))?;
    serde_json::from_value(Value::Object(object)).map_err(|e| PlanningError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, ScriptedProvider, StaticTool, registry, router};
    use serde_json::json;
    use shihui_core::plan::ResponseType;
    use shihui_core::tool::ToolCategory;

    fn tools() -> Arc<ToolRegistry> {
        registry(vec![
            Arc::new(StaticTool::ok("image_search", ToolCategory::Image, json!({}))),
            Arc::new(StaticTool::ok("recipe_generator", ToolCategory::Recipe, json!({}))),
        ])
    }

    #[test]
    fn parses_fenced_plan() {
        let reply = "好的，计划如下：\n```json\n{\"intent\": \"看图\", \"tools\": [\"image_search\"], \
                     \"parameters\": {\"image_search\": {\"query\": \"红烧肉\"}}, \"response_type\": \"image\"}\n```";
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.tools, vec!["image_search"]);
        assert_eq!(plan.response_type, ResponseType::Image);
    }

    #[test]
    fn rejects_unknown_response_type() {
        let err = parse_plan(r#"{"intent": "x", "response_type": "video"}"#).unwrap_err();
        assert!(matches!(err, PlanningError::Malformed(_)));
    }

    #[tokio::test]
    async fn uses_model_plan_with_planner_sampling() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"intent": "菜谱", "tools": ["recipe_generator"], "parameters": {"recipe_generator": {"dish_name": "鱼香肉丝"}}, "response_type": "recipe"}"#,
        ]));
        let planner = Planner::new(router(provider.clone()), tools());
        let ctx = ConversationContext::new("u", "s");

        let plan = planner.plan("鱼香肉丝怎么做", &ctx, None).await;
        assert_eq!(plan.intent, "菜谱");
        assert_eq!(plan.params_for("recipe_generator")["dish_name"], "鱼香肉丝");

        let request = &provider.requests()[0];
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_tokens, Some(1000));
        assert!(request.messages[0].content.contains("recipe_generator"));
    }

    #[tokio::test]
    async fn prose_reply_falls_back_to_rules() {
        let provider = Arc::new(ScriptedProvider::texts(&["我觉得你应该去看看图片"]));
        let planner = Planner::new(router(provider), tools());
        let plan = planner.plan("给我看看红烧肉的图片", &ConversationContext::new("u", "s"), None).await;
        assert_eq!(plan.tools, vec!["image_search"]);
        assert!(plan.params_for("image_search")["query"].as_str().unwrap().contains("红烧肉"));
    }

    #[tokio::test]
    async fn enabled_tools_filter_model_and_fallback_plans() {
        let mut ctx = ConversationContext::new("u", "s");
        ctx.set_enabled_tools(["image_search"]);

        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"intent": "菜谱", "tools": ["recipe_generator", "image_search"], "response_type": "recipe"}"#,
        ]));
        let planner = Planner::new(router(provider), tools());
        let plan = planner.plan("红烧肉怎么做", &ctx, None).await;
        assert_eq!(plan.tools, vec!["image_search"]);
        assert_eq!(plan.response_type, ResponseType::Recipe);

        let planner = Planner::new(router(Arc::new(FailingProvider)), tools());
        let plan = planner.plan("红烧肉怎么做", &ctx, None).await;
        assert_eq!(plan.tools, vec!["image_search"]);
    }

    #[tokio::test]
    async fn detailed_fallback_explains_itself() {
        let planner = Planner::new(router(Arc::new(FailingProvider)), tools());
        let ctx = ConversationContext::new("u", "s");
        let plan = planner.plan_detailed("你好", &ctx, None).await;
        assert_eq!(plan.strategy.as_deref(), Some(FALLBACK_STRATEGY));
        assert!(plan.reasoning.unwrap().starts_with("AI调用失败："));

        let provider = Arc::new(ScriptedProvider::texts(&["not json"]));
        let planner = Planner::new(router(provider), tools());
        let plan = planner.plan_detailed("你好", &ctx, None).await;
        assert_eq!(plan.reasoning.as_deref(), Some(MALFORMED_REASONING));
    }

    #[tokio::test]
    async fn empty_reply_and_missing_model_fall_back() {
        let ctx = ConversationContext::new("u", "s");
        let planner = Planner::new(router(Arc::new(ScriptedProvider::texts(&["  "]))), tools());
        assert_eq!(planner.plan("今天吃什么", &ctx, None).await.tools, vec!["food_recommendation"]);

        let planner = Planner::new(Arc::new(ModelRouter::new("none")), tools());
        assert_eq!(planner.plan("附近的餐厅", &ctx, None).await.tools, vec!["amap_search"]);
    }

    #[tokio::test]
    async fn publishes_plan_created() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let planner = Planner::new(router(Arc::new(FailingProvider)), tools()).with_event_bus(bus);
        planner.plan("你好", &ConversationContext::new("u", "s1"), None).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::PlanCreated { session_id, fallback, tools, .. } => {
                assert_eq!(session_id, "s1");
                assert!(fallback);
                assert!(tools.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn intent_analysis_streams_with_its_own_sampling() {
        let provider = Arc::new(ScriptedProvider::texts(&["用户想知道红烧肉的做法"]));
        let planner = Planner::new(router(provider.clone()), tools());
        let mut rx = planner
            .analyze_intent("红烧肉怎么做", &ConversationContext::new("u", "s"), None)
            .await
            .unwrap();
        let mut text = String::new();
        while let Some(Ok(chunk)) = rx.recv().await {
            text.push_str(chunk.content.as_deref().unwrap_or_default());
        }
        assert_eq!(text, "用户想知道红烧肉的做法");
        let request = &provider.requests()[0];
        assert!(request.stream);
        assert_eq!(request.max_tokens, Some(800));
    }
}
