//! Thinking-chain streaming events.
//!
//! `ThinkingEvent` is the wire shape of a streamed turn: stage progress,
//! tool reports, reply fragments and a terminal event.

use serde::{Deserialize, Serialize};
use shihui_core::display::DisplayEnvelope;
use shihui_core::tool::ToolOutcome;

/// Progress of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Processing,
    Completed,
}

/// The four stages of a streamed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Understand = 1,
    Plan = 2,
    Gather = 3,
    Compose = 4,
}

impl Stage {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Understand => "理解用户需求",
            Stage::Plan => "制定解决方案",
            Stage::Gather => "收集信息",
            Stage::Compose => "组织回答",
        }
    }
}

/// One tool's raw outcome together with its display envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    pub outcome: ToolOutcome,
    pub display: DisplayEnvelope,
}

/// Final metadata of a streamed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub memory_updated: bool,
    pub tools_used: Vec<String>,
}

/// Events emitted while a turn is streamed.
///
/// - `start`          — the turn was accepted
/// - `thinking_step`  — progress of one of the four stages
/// - `action_result`  — every tool report of stage 3
/// - `response_chunk` — a fragment of the reply
/// - `complete`       — the turn finished
/// - `error`          — the turn was aborted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingEvent {
    Start { content: String },

    ThinkingStep {
        step: u8,
        title: String,
        content: String,
        status: StepStatus,
    },

    ActionResult { content: Vec<ToolReport> },

    ResponseChunk { content: String },

    Complete { content: TurnSummary },

    Error { content: String },
}

impl ThinkingEvent {
    pub fn step(stage: Stage, content: impl Into<String>, status: StepStatus) -> Self {
        Self::ThinkingStep {
            step: stage.number(),
            title: stage.title().to_string(),
            content: content.into(),
            status,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::ThinkingStep { .. } => "thinking_step",
            Self::ActionResult { .. } => "action_result",
            Self::ResponseChunk { .. } => "response_chunk",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shihui_core::display::DisplayType;

    #[test]
    fn thinking_step_wire_shape() {
        let event = ThinkingEvent::step(Stage::Plan, "我的计划：", StepStatus::Processing);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "thinking_step", "step": 2, "title": "制定解决方案", "content": "我的计划：", "status": "processing"})
        );
    }

    #[test]
    fn complete_nests_summary() {
        let event = ThinkingEvent::Complete {
            content: TurnSummary { memory_updated: true, tools_used: vec!["image_search".into()] },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["content"]["tools_used"][0], "image_search");
        assert!(event.is_terminal());
    }

    #[test]
    fn action_result_carries_outcome_and_envelope() {
        let event = ThinkingEvent::ActionResult {
            content: vec![ToolReport {
                outcome: ToolOutcome::failed("bing_search", "未配置 BING_API_KEY", 0.0),
                display: DisplayEnvelope {
                    tool_name: "bing_search".into(),
                    display_type: DisplayType::Error,
                    display_config: json!({}),
                    display_data: json!({"error": "未配置 BING_API_KEY"}),
                },
            }],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["content"][0]["outcome"]["success"], false);
        assert_eq!(value["content"][0]["display"]["display_type"], "error");
        assert_eq!(event.event_type(), "action_result");
    }

    #[test]
    fn deserializes_chunk() {
        let event: ThinkingEvent = serde_json::from_str(r#"{"type":"response_chunk","content":"你好"}"#).unwrap();
        assert_eq!(event, ThinkingEvent::ResponseChunk { content: "你好".into() });
        assert!(!event.is_terminal());
    }
}
