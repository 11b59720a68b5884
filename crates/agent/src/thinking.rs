//! Thinking-chain state machine.
//!
//! Every event of a streamed turn passes through [`ThinkingChain`], which
//! checks it against the protocol before sending it:
//!
//! ```text
//! Idle → Started → Stage 1 → Stage 2 → [Stage 3] → Stage 4 → Complete
//!                    any non-terminal state → Error
//! ```
//!
//! Within a stage, `processing` events may repeat until exactly one
//! `completed`. The next stage starts only after the current one completed.

use shihui_core::plan::Plan;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::stream_event::{Stage, StepStatus, ThinkingEvent, ToolReport, TurnSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    Started,
    InStage { stage: Stage, completed: bool },
    Complete,
    Error,
}

#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("{event} not allowed in state {state:?}")]
    InvalidTransition { state: ChainState, event: &'static str },

    #[error("stream receiver dropped")]
    Closed,
}

fn stage_from(step: u8) -> Option<Stage> {
    match step {
        1 => Some(Stage::Understand),
        2 => Some(Stage::Plan),
        3 => Some(Stage::Gather),
        4 => Some(Stage::Compose),
        _ => None,
    }
}

/// Whether `next` may start once `current` has completed.
fn follows(current: Stage, next: Stage) -> bool {
    matches!(
        (current, next),
        (Stage::Understand, Stage::Plan)
            | (Stage::Plan, Stage::Gather)
            | (Stage::Plan, Stage::Compose)
            | (Stage::Gather, Stage::Compose)
    )
}

impl ChainState {
    /// The state after `event`, or why it is not allowed.
    pub fn next(self, event: &ThinkingEvent) -> Result<ChainState, ChainError> {
        use ChainState::*;

        let invalid = || ChainError::InvalidTransition { state: self, event: event.event_type() };
        match (self, event) {
            (Complete | Error, _) => Err(invalid()),
            (_, ThinkingEvent::Error { .. }) => Ok(Error),
            (Idle, ThinkingEvent::Start { .. }) => Ok(Started),

            (_, ThinkingEvent::ThinkingStep { step, status, .. }) => {
                let stage = stage_from(*step).ok_or_else(invalid)?;
                let completed = *status == StepStatus::Completed;
                let allowed = match self {
                    Started => stage == Stage::Understand,
                    InStage { stage: current, completed: false } => current == stage,
                    InStage { stage: current, completed: true } => follows(current, stage),
                    _ => false,
                };
                if allowed { Ok(InStage { stage, completed }) } else { Err(invalid()) }
            }

            (InStage { stage: Stage::Gather, completed: true }, ThinkingEvent::ActionResult { .. }) => Ok(self),
            (InStage { stage: Stage::Compose, completed: false }, ThinkingEvent::ResponseChunk { .. }) => Ok(self),
            (InStage { stage: Stage::Compose, completed: true }, ThinkingEvent::Complete { .. }) => Ok(Complete),
            _ => Err(invalid()),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChainState::Complete | ChainState::Error)
    }
}

/// Sending half of a thinking chain; validates every event.
pub struct ThinkingChain {
    tx: mpsc::Sender<ThinkingEvent>,
    state: ChainState,
}

impl ThinkingChain {
    pub fn new(tx: mpsc::Sender<ThinkingEvent>) -> Self {
        Self { tx, state: ChainState::Idle }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub async fn emit(&mut self, event: ThinkingEvent) -> Result<(), ChainError> {
        let next = self.state.next(&event)?;
        self.tx.send(event).await.map_err(|_| ChainError::Closed)?;
        self.state = next;
        Ok(())
    }

    pub async fn start(&mut self, content: &str) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::Start { content: content.to_string() }).await
    }

    pub async fn processing(&mut self, stage: Stage, content: impl Into<String>) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::step(stage, content, StepStatus::Processing)).await
    }

    pub async fn completed(&mut self, stage: Stage, content: impl Into<String>) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::step(stage, content, StepStatus::Completed)).await
    }

    pub async fn action_result(&mut self, reports: Vec<ToolReport>) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::ActionResult { content: reports }).await
    }

    pub async fn chunk(&mut self, content: String) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::ResponseChunk { content }).await
    }

    pub async fn complete(&mut self, summary: TurnSummary) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::Complete { content: summary }).await
    }

    pub async fn error(&mut self, content: impl Into<String>) -> Result<(), ChainError> {
        self.emit(ThinkingEvent::Error { content: content.into() }).await
    }
}

/// The plan as shown in stage 2, one line at a time.
pub fn plan_lines(plan: &Plan) -> Vec<String> {
    vec![
        "我的计划：".to_string(),
        format!("• 用户意图：{}", if plan.intent.is_empty() { "未知" } else { &plan.intent }),
        format!(
            "• 需要使用的工具：{}",
            if plan.tools.is_empty() { "无".to_string() } else { plan.tools.join(", ") }
        ),
        format!("• 回答类型：{}", plan.response_type.as_str()),
        format!("• 策略：{}", plan.strategy.as_deref().unwrap_or("直接回答用户问题")),
    ]
}

fn report_line(report: &ToolReport) -> String {
    let name = report.outcome.tool_name.as_str();
    if !report.outcome.success {
        return format!("{name}：执行失败");
    }
    let data = &report.display.display_data;
    match name {
        "image_search" => {
            let count = data.get("images").and_then(|v| v.as_array()).map_or(0, Vec::len);
            format!("图片搜索：找到 {count} 张相关图片")
        }
        "food_recommendation" => {
            let count = data.get("total_count").and_then(|v| v.as_u64()).unwrap_or(0);
            format!("美食推荐：生成 {count} 个推荐")
        }
        "recipe_generator" => {
            let dish = data
                .pointer("/recipe/dish_name")
                .and_then(|v| v.as_str())
                .unwrap_or("菜谱");
            format!("菜谱生成：制作 {dish} 的详细菜谱")
        }
        _ => format!("{name}：执行成功"),
    }
}

/// Stage 3 completion text.
pub fn gather_summary(reports: &[ToolReport]) -> String {
    let lines: Vec<String> = reports.iter().map(|r| format!("• {}", report_line(r))).collect();
    format!("信息收集完成：\n{}\n\n现在我有了足够的信息来回答您的问题。", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shihui_core::display::{DisplayEnvelope, DisplayType};
    use shihui_core::tool::{ToolOutcome, ToolParams};

    fn step(stage: Stage, status: StepStatus) -> ThinkingEvent {
        ThinkingEvent::step(stage, "", status)
    }

    fn run(events: &[ThinkingEvent]) -> Result<ChainState, ChainError> {
        events.iter().try_fold(ChainState::Idle, |state, event| state.next(event))
    }

    fn summary() -> ThinkingEvent {
        ThinkingEvent::Complete { content: TurnSummary { memory_updated: true, tools_used: vec![] } }
    }

    #[test]
    fn full_chain_without_tools() {
        use StepStatus::*;
        let events = [
            ThinkingEvent::Start { content: String::new() },
            step(Stage::Understand, Processing),
            step(Stage::Understand, Processing),
            step(Stage::Understand, Completed),
            step(Stage::Plan, Processing),
            step(Stage::Plan, Completed),
            step(Stage::Compose, Processing),
            ThinkingEvent::ResponseChunk { content: "好".into() },
            step(Stage::Compose, Completed),
            summary(),
        ];
        assert_eq!(run(&events), Ok(ChainState::Complete));
    }

    #[test]
    fn gather_stage_with_action_result() {
        use StepStatus::*;
        let events = [
            ThinkingEvent::Start { content: String::new() },
            step(Stage::Understand, Completed),
            step(Stage::Plan, Completed),
            step(Stage::Gather, Processing),
            step(Stage::Gather, Completed),
            ThinkingEvent::ActionResult { content: vec![] },
            step(Stage::Compose, Completed),
            summary(),
        ];
        assert_eq!(run(&events), Ok(ChainState::Complete));
    }

    #[test]
    fn rejects_out_of_order_events() {
        use StepStatus::*;
        let start = ThinkingEvent::Start { content: String::new() };

        // Skipping stage 1.
        assert!(run(&[start.clone(), step(Stage::Plan, Processing)]).is_err());
        // Moving on before the stage completed.
        assert!(run(&[start.clone(), step(Stage::Understand, Processing), step(Stage::Plan, Processing)]).is_err());
        // Going back.
        assert!(run(&[start.clone(), step(Stage::Understand, Completed), step(Stage::Understand, Processing)]).is_err());
        // Complete before stage 4 completed.
        assert!(run(&[start.clone(), step(Stage::Understand, Completed), summary()]).is_err());
        // Chunks outside stage 4.
        assert!(run(&[start, ThinkingEvent::ResponseChunk { content: "x".into() }]).is_err());
        // Unknown stage number.
        let bogus = ThinkingEvent::ThinkingStep { step: 7, title: String::new(), content: String::new(), status: Processing };
        assert!(ChainState::Started.next(&bogus).is_err());
    }

    #[test]
    fn error_is_absorbing() {
        let err = ThinkingEvent::Error { content: "x".into() };
        let state = ChainState::InStage { stage: Stage::Gather, completed: false }.next(&err).unwrap();
        assert_eq!(state, ChainState::Error);
        assert!(state.next(&err).is_err());
        assert!(ChainState::Complete.next(&err).is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_closes_chain() {
        let (tx, rx) = mpsc::channel(4);
        let mut chain = ThinkingChain::new(tx);
        chain.start("开始").await.unwrap();
        drop(rx);
        assert_eq!(chain.processing(Stage::Understand, "x").await, Err(ChainError::Closed));
        assert_eq!(chain.state(), ChainState::Started);
    }

    #[tokio::test]
    async fn invalid_event_is_not_sent() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut chain = ThinkingChain::new(tx);
        assert!(chain.chunk("x".into()).await.is_err());
        drop(chain);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn plan_lines_defaults() {
        let lines = plan_lines(&Plan::text("闲聊"));
        assert_eq!(lines[1], "• 用户意图：闲聊");
        assert_eq!(lines[2], "• 需要使用的工具：无");
        assert_eq!(lines[3], "• 回答类型：text");
        assert_eq!(lines[4], "• 策略：直接回答用户问题");

        let plan = Plan::text("x")
            .with_tool("image_search", ToolParams::new())
            .with_tool("recipe_generator", ToolParams::new());
        assert_eq!(plan_lines(&plan)[2], "• 需要使用的工具：image_search, recipe_generator");
    }

    #[test]
    fn gather_summary_lines() {
        let ok = |name: &str, data| ToolReport {
            outcome: ToolOutcome::ok(name, json!({}), 0.1),
            display: DisplayEnvelope {
                tool_name: name.into(),
                display_type: DisplayType::SimpleText,
                display_config: json!({}),
                display_data: data,
            },
        };
        let failed = ToolReport {
            outcome: ToolOutcome::failed("weather_api", "down", 0.0),
            display: DisplayEnvelope {
                tool_name: "weather_api".into(),
                display_type: DisplayType::Error,
                display_config: json!({}),
                display_data: json!({"error": "down"}),
            },
        };
        let text = gather_summary(&[
            ok("image_search", json!({"images": [1, 2, 3]})),
            ok("food_recommendation", json!({"total_count": 5})),
            ok("recipe_generator", json!({"recipe": {"dish_name": "红烧肉"}})),
            ok("bing_search", json!({})),
            failed,
        ]);
        assert_eq!(
            text,
            "信息收集完成：\n• 图片搜索：找到 3 张相关图片\n• 美食推荐：生成 5 个推荐\n\
             • 菜谱生成：制作 红烧肉 的详细菜谱\n• bing_search：执行成功\n• weather_api：执行失败\n\n\
             现在我有了足够的信息来回答您的问题。"
        );
    }
}
