//! Response synthesizer — writes the final reply from the plan and tool
//! results.
//!
//! The only side effect is appending a successful reply to the conversation
//! as an assistant turn.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use shihui_core::context::DEFAULT_HISTORY_WINDOW;
use shihui_core::error::ProviderError;
use shihui_core::message::{Message, Role};
use shihui_core::plan::Plan;
use shihui_core::provider::{Provider, ProviderRequest};
use shihui_providers::ModelRouter;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::context_store::SharedContext;
use crate::stream_event::ToolReport;

/// Reply used when the model cannot be reached.
pub const APOLOGY: &str = "抱歉，我暂时无法处理您的请求，请稍后再试。";

/// Receiving half of a streamed reply. Finite; an `Err` is the last item.
pub type FragmentReceiver = mpsc::Receiver<Result<String, ProviderError>>;

const FRIENDLY: &str = "你是食慧美食AI助手，一个热情友好的美食专家。你的特点：

1. **专业知识**：精通中华料理、世界各地美食、营养搭配、烹饪技巧
2. **性格特点**：热情、耐心、幽默、善于倾听
3. **交流风格**：用温暖的语调，适当使用表情符号，让用户感到亲切
4. **服务理念**：以用户需求为中心，提供个性化的美食建议

你能够：
- 🍳 推荐适合的菜谱和做法
- 🗺️ 根据地理位置推荐当地美食
- 🌡️ 结合天气情况给出饮食建议
- 📷 识别食物图片并提供相关信息
- 💡 记住用户的口味偏好和饮食习惯
- 🎯 制定个性化的饮食计划

请始终保持友好、专业的态度，用你的专业知识帮助用户享受美食生活！";

const PROFESSIONAL: &str = "您好，我是食慧美食AI专业顾问。作为专业的美食分析系统，我具备：

1. **专业能力**：深度美食知识库、营养学分析、烹饪工艺研究
2. **服务标准**：准确、高效、个性化、数据驱动
3. **技术优势**：多模态分析、智能推荐、实时信息获取
4. **专业领域**：菜谱分析、营养评估、食材搭配、烹饪指导

核心功能：
- 精准的食谱匹配与优化建议
- 基于地理位置的餐饮信息查询
- 营养成分分析与健康建议
- 食物图像识别与成分分析
- 个性化饮食方案制定
- 专业烹饪技巧指导

我将为您提供最专业、准确的美食咨询服务。";

const CLOSING: &str = "请基于以上信息，生成一个有用、准确、友好的回复。如果使用了工具，请整合工具结果来增强你的回答。";

/// Voice of the assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Persona {
    #[default]
    Friendly,
    Professional,
}

impl Persona {
    /// Parse a configured persona name; anything unrecognised is friendly.
    pub fn from_name(name: &str) -> Self {
        match name {
            "professional" | "professional_food_expert" => Persona::Professional,
            _ => Persona::Friendly,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Persona::Friendly => FRIENDLY,
            Persona::Professional => PROFESSIONAL,
        }
    }
}

/// Tool results as the model sees them: tool name to data or error.
fn results_view(reports: &[ToolReport]) -> Value {
    let view: Map<String, Value> = reports
        .iter()
        .map(|report| {
            let entry = if report.outcome.success {
                json!({"display_type": report.display.display_type, "data": report.display.display_data})
            } else {
                json!({"error": report.outcome.error})
            };
            (report.outcome.tool_name.clone(), entry)
        })
        .collect();
    Value::Object(view)
}

async fn report_failure(tx: &mpsc::Sender<Result<String, ProviderError>>, e: ProviderError) {
    warn!(error = %e, "Streamed reply failed");
    if tx.send(Ok(format!("抱歉，生成回复时出现错误：{e}"))).await.is_ok() {
        let _ = tx.send(Err(e)).await;
    }
}

pub struct Synthesizer {
    router: Arc<ModelRouter>,
    persona: Persona,
    history_window: usize,
}

impl Synthesizer {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self {
            router,
            persona: Persona::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(1);
        self
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    async fn messages(
        &self,
        message: &str,
        context: &SharedContext,
        plan: &Plan,
        reports: &[ToolReport],
        streaming: bool,
    ) -> Vec<Message> {
        let ctx = context.lock().await;
        let mut system = format!(
            "{}\n\n当前对话上下文：\n- 用户偏好：{}\n- 当前位置：{}\n- 执行的工具：{}\n- 工具结果：{}",
            self.persona.prompt(),
            Value::Object(ctx.preferences.clone()),
            ctx.location.as_deref().unwrap_or("未知"),
            if plan.tools.is_empty() { "无".to_string() } else { plan.tools.join(", ") },
            results_view(reports),
        );
        if !streaming {
            system.push_str("\n\n");
            system.push_str(CLOSING);
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(ctx.recent(self.history_window).iter().cloned());
        let ends_with_turn = messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == message);
        if !ends_with_turn {
            messages.push(Message::user(message));
        }
        messages
    }

    async fn request(
        &self,
        message: &str,
        context: &SharedContext,
        plan: &Plan,
        reports: &[ToolReport],
        model_id: Option<&str>,
        streaming: bool,
    ) -> Result<(Arc<dyn Provider>, ProviderRequest), ProviderError> {
        let route = self
            .router
            .resolve(model_id)
            .ok_or_else(|| ProviderError::NotConfigured("no completion model".into()))?;
        let messages = self.messages(message, context, plan, reports, streaming).await;
        let request = route.request(messages);
        let request = if streaming { request.streaming() } else { request };
        Ok((route.provider.clone(), request))
    }

    /// Write the reply. Returns [`APOLOGY`] when the model fails.
    pub async fn compose(
        &self,
        message: &str,
        context: &SharedContext,
        plan: &Plan,
        reports: &[ToolReport],
        model_id: Option<&str>,
    ) -> String {
        let reply = match self.request(message, context, plan, reports, model_id, false).await {
            Ok((provider, request)) => provider.complete(request).await.map(|r| r.message.content),
            Err(e) => Err(e),
        };

        match reply {
            Ok(text) => {
                info!(chars = text.chars().count(), "Reply composed");
                context.lock().await.push(Message::assistant(text.clone()));
                text
            }
            Err(e) => {
                error!(error = %e, "Reply generation failed");
                APOLOGY.to_string()
            }
        }
    }

    /// Stream the reply as fragments.
    ///
    /// On failure an explanatory fragment is sent, followed by the error. A
    /// dropped receiver stops the stream.
    pub async fn compose_stream(
        &self,
        message: &str,
        context: &SharedContext,
        plan: &Plan,
        reports: &[ToolReport],
        model_id: Option<&str>,
    ) -> FragmentReceiver {
        let (tx, rx) = mpsc::channel(64);
        let prepared = self.request(message, context, plan, reports, model_id, true).await;
        let context = context.clone();

        tokio::spawn(async move {
            let (provider, request) = match prepared {
                Ok(p) => p,
                Err(e) => return report_failure(&tx, e).await,
            };
            let mut chunks = match provider.stream(request).await {
                Ok(rx) => rx,
                Err(e) => return report_failure(&tx, e).await,
            };

            let mut reply = String::new();
            while let Some(chunk) = chunks.recv().await {
                match chunk {
                    Ok(chunk) => {
                        let Some(content) = chunk.content.filter(|c| !c.is_empty()) else { continue };
                        reply.push_str(&content);
                        if tx.send(Ok(content)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => return report_failure(&tx, e).await,
                }
            }

            if !reply.is_empty() {
                info!(chars = reply.chars().count(), "Streamed reply composed");
                context.lock().await.push(Message::assistant(reply));
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BrokenStreamProvider, FailingProvider, ScriptedProvider, router};
    use shihui_core::context::ConversationContext;
    use shihui_core::display::{DisplayEnvelope, DisplayType};
    use shihui_core::tool::ToolOutcome;
    use tokio::sync::Mutex;

    fn context_with(messages: usize) -> SharedContext {
        let mut ctx = ConversationContext::new("u", "s");
        for i in 0..messages {
            ctx.push(Message::user(format!("问题{i}")));
        }
        ctx.push(Message::user("红烧肉怎么做"));
        Arc::new(Mutex::new(ctx))
    }

    fn report() -> ToolReport {
        ToolReport {
            outcome: ToolOutcome::ok("recipe_generator", json!({"data": {"dish_name": "红烧肉"}}), 0.2),
            display: DisplayEnvelope {
                tool_name: "recipe_generator".into(),
                display_type: DisplayType::RecipeDetailed,
                display_config: json!({}),
                display_data: json!({"recipe": {"dish_name": "红烧肉"}}),
            },
        }
    }

    #[tokio::test]
    async fn compose_builds_prompt_and_records_reply() {
        let provider = Arc::new(ScriptedProvider::texts(&["先焯水，再炒糖色。"]));
        let synth = Synthesizer::new(router(provider.clone())).with_persona(Persona::Professional);
        let ctx = context_with(12);
        let plan = Plan::text("菜谱").with_tool("recipe_generator", Default::default());

        let reply = synth.compose("红烧肉怎么做", &ctx, &plan, &[report()], None).await;
        assert_eq!(reply, "先焯水，再炒糖色。");

        let request = &provider.requests()[0];
        let system = &request.messages[0].content;
        assert!(system.starts_with("您好，我是食慧美食AI专业顾问"));
        assert!(system.contains("- 执行的工具：recipe_generator"));
        assert!(system.contains("红烧肉"));
        assert!(system.ends_with(CLOSING));
        // System prompt plus the last ten messages.
        assert_eq!(request.messages.len(), 11);
        assert_eq!(request.messages.last().unwrap().content, "红烧肉怎么做");

        let ctx = ctx.lock().await;
        assert_eq!(ctx.messages.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn failing_provider_yields_apology() {
        let synth = Synthesizer::new(router(Arc::new(FailingProvider)));
        let ctx = context_with(0);
        let reply = synth.compose("红烧肉怎么做", &ctx, &Plan::text("x"), &[], None).await;
        assert_eq!(reply, APOLOGY);
        assert_eq!(ctx.lock().await.messages.len(), 1);
    }

    #[tokio::test]
    async fn missing_turn_is_appended() {
        let provider = Arc::new(ScriptedProvider::texts(&["好的"]));
        let synth = Synthesizer::new(router(provider.clone()));
        let ctx = Arc::new(Mutex::new(ConversationContext::new("u", "s")));
        synth.compose("你好", &ctx, &Plan::text("x"), &[], None).await;
        let request = &provider.requests()[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content, "你好");
    }

    #[tokio::test]
    async fn stream_yields_fragments_then_records_reply() {
        let provider = Arc::new(ScriptedProvider::texts(&["红烧肉要小火慢炖一个小时"]));
        let synth = Synthesizer::new(router(provider.clone()));
        let ctx = context_with(0);
        let mut rx = synth.compose_stream("红烧肉怎么做", &ctx, &Plan::text("x"), &[], None).await;

        let mut text = String::new();
        let mut fragments = 0;
        while let Some(item) = rx.recv().await {
            text.push_str(&item.unwrap());
            fragments += 1;
        }
        assert_eq!(text, "红烧肉要小火慢炖一个小时");
        assert!(fragments > 1);
        assert!(provider.requests()[0].stream);
        assert!(!provider.requests()[0].messages[0].content.contains(CLOSING));

        let ctx = ctx.lock().await;
        assert_eq!(ctx.messages.last().unwrap().content, "红烧肉要小火慢炖一个小时");
    }

    #[tokio::test]
    async fn stream_failure_explains_then_errors() {
        let synth = Synthesizer::new(router(Arc::new(FailingProvider)));
        let ctx = context_with(0);
        let mut rx = synth.compose_stream("x", &ctx, &Plan::text("x"), &[], None).await;
        let first = rx.recv().await.unwrap().unwrap();
        assert!(first.starts_with("抱歉，生成回复时出现错误："));
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
        assert_eq!(ctx.lock().await.messages.len(), 1);
    }

    #[tokio::test]
    async fn interrupted_stream_is_reported() {
        let synth = Synthesizer::new(router(Arc::new(BrokenStreamProvider)));
        let ctx = context_with(0);
        let mut rx = synth.compose_stream("x", &ctx, &Plan::text("x"), &[], None).await;
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        assert_eq!(items[0].as_deref().unwrap(), "好的，");
        assert!(items[1].as_ref().unwrap().starts_with("抱歉，生成回复时出现错误："));
        assert!(matches!(items[2], Err(ProviderError::StreamInterrupted(_))));
    }

    #[test]
    fn persona_names() {
        assert_eq!(Persona::from_name("professional_food_expert"), Persona::Professional);
        assert_eq!(Persona::from_name("friendly_food_expert"), Persona::Friendly);
        assert_eq!(Persona::from_name("pirate"), Persona::Friendly);
    }
}
