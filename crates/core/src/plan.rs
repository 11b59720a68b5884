//! Plan — the structured decision the planner hands to the dispatcher.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::tool::ToolParams;

/// Shape of the answer the assistant intends to give.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Text,
    Recipe,
    Recommendation,
    Location,
    Image,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Text => "text",
            ResponseType::Recipe => "recipe",
            ResponseType::Recommendation => "recommendation",
            ResponseType::Location => "location",
            ResponseType::Image => "image",
        }
    }
}

/// A structured plan for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub intent: String,

    /// Tool names in execution order.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Per-tool parameters, keyed by tool name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ToolParams>,

    #[serde(default)]
    pub response_type: ResponseType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Plan {
    /// A plan that calls no tools.
    pub fn text(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            ..Self::default()
        }
    }

    /// Append a tool with its parameters.
    pub fn with_tool(mut self, name: &str, params: ToolParams) -> Self {
        self.tools.push(name.to_string());
        self.parameters.insert(name.to_string(), params);
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Parameters for a tool; empty if the plan declared none.
    pub fn params_for(&self, tool: &str) -> ToolParams {
        self.parameters.get(tool).cloned().unwrap_or_default()
    }

    /// Drop tools outside `enabled`. An empty set means no restriction.
    ///
    /// `response_type` is left as chosen.
    pub fn retain_enabled(&mut self, enabled: &BTreeSet<String>) {
        if enabled.is_empty() {
            return;
        }
        self.tools.retain(|t| enabled.contains(t));
        self.parameters.retain(|t, _| enabled.contains(t));
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_model_output_with_defaults() {
        let plan: Plan = serde_json::from_value(json!({
            "intent": "搜索美食图片",
            "tools": ["image_search"],
            "parameters": {"image_search": {"query": "红烧肉", "count": 5}},
            "response_type": "image"
        }))
        .unwrap();
        assert_eq!(plan.response_type, ResponseType::Image);
        assert_eq!(plan.params_for("image_search")["count"], 5);
        assert!(plan.strategy.is_none());
    }

    #[test]
    fn unknown_response_type_is_rejected() {
        let parsed = serde_json::from_value::<Plan>(json!({"response_type": "video"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn retain_enabled_filters_tools_but_keeps_response_type() {
        let mut plan = Plan::text("生成菜谱并展示图片")
            .with_tool("recipe_generator", ToolParams::new())
            .with_tool("image_search", ToolParams::new())
            .with_response_type(ResponseType::Recipe);
        let enabled: BTreeSet<String> = ["image_search".to_string()].into();
        plan.retain_enabled(&enabled);
        assert_eq!(plan.tools, vec!["image_search"]);
        assert!(!plan.parameters.contains_key("recipe_generator"));
        assert_eq!(plan.response_type, ResponseType::Recipe);
    }

    #[test]
    fn empty_enabled_set_keeps_everything() {
        let mut plan = Plan::text("x").with_tool("bing_search", ToolParams::new());
        plan.retain_enabled(&BTreeSet::new());
        assert_eq!(plan.tools.len(), 1);
    }
}
