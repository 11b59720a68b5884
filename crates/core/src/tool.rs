//! Tool trait — the abstraction over assistant capabilities.
//!
//! Tools are what let the assistant act: search images, recommend dishes,
//! generate recipes, look up weather or nearby restaurants. Each tool declares
//! typed parameter metadata so the dispatcher can validate calls before they
//! reach the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;

/// Parameters passed to a tool call.
pub type ToolParams = serde_json::Map<String, serde_json::Value>;

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

/// The typed parameter schema of a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub fields: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.fields.push(ParameterSpec {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        });
        self
    }

    /// Declare an optional parameter.
    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.fields.push(ParameterSpec {
            name: name.into(),
            kind,
            required: false,
            description: description.into(),
        });
        self
    }

    /// Names of all required parameters, in declaration order.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name.as_str())
    }

    /// First required parameter absent from `params`, if any.
    pub fn first_missing(&self, params: &ToolParams) -> Option<&str> {
        self.required_names().find(|name| !params.contains_key(*name))
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    serde_json::json!({ "type": f.kind.as_str(), "description": f.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.required_names().collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Coarse grouping of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Search,
    Recommendation,
    Recipe,
    Image,
    Weather,
    Location,
    General,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Search => "search",
            ToolCategory::Recommendation => "recommendation",
            ToolCategory::Recipe => "recipe",
            ToolCategory::Image => "image",
            ToolCategory::Weather => "weather",
            ToolCategory::Location => "location",
            ToolCategory::General => "general",
        }
    }
}

/// Registry-facing description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub category: ToolCategory,
    pub enabled: bool,

    /// Max calls per rolling 60 s window; `None` means unconstrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// Result of one dispatched tool call.
///
/// Failures never escape the dispatcher as errors; they are recorded here
/// with `success = false` and an error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub tool_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Seconds spent inside the implementation (0 when rejected earlier).
    pub execution_time: f64,
}

impl ToolOutcome {
    pub fn ok(tool_name: impl Into<String>, result: serde_json::Value, execution_time: f64) -> Self {
        Self {
            success: true,
            tool_name: tool_name.into(),
            result: Some(result),
            error: None,
            execution_time,
        }
    }

    pub fn failed(tool_name: impl Into<String>, error: impl ToString, execution_time: f64) -> Self {
        Self {
            success: false,
            tool_name: tool_name.into(),
            result: None,
            error: Some(error.to_string()),
            execution_time,
        }
    }
}

/// The core Tool trait.
///
/// Implementations are registered with the dispatcher, which validates
/// parameters and applies rate limits before calling `execute`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "image_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the planner).
    fn description(&self) -> &str;

    /// Declared parameters.
    fn parameters(&self) -> ParameterSchema;

    fn category(&self) -> ToolCategory {
        ToolCategory::General
    }

    /// Default max calls per minute.
    fn rate_limit(&self) -> Option<u32> {
        None
    }

    /// Execute the tool with already-validated parameters.
    async fn execute(&self, params: &ToolParams) -> std::result::Result<serde_json::Value, ToolError>;

    /// Snapshot this tool's metadata.
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
            category: self.category(),
            enabled: true,
            rate_limit: self.rate_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recipe_schema() -> ParameterSchema {
        ParameterSchema::new()
            .required("dish_name", ParamKind::String, "菜品名称")
            .optional("model_id", ParamKind::String, "使用的模型")
    }

    #[test]
    fn schema_reports_first_missing_required() {
        let schema = recipe_schema();
        let mut params = ToolParams::new();
        assert_eq!(schema.first_missing(&params), Some("dish_name"));
        params.insert("dish_name".into(), json!("红烧肉"));
        assert_eq!(schema.first_missing(&params), None);
    }

    #[test]
    fn schema_renders_json_schema() {
        let value = recipe_schema().to_json_schema();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["dish_name"]["type"], "string");
        assert_eq!(value["required"], json!(["dish_name"]));
    }

    #[test]
    fn outcome_serialization_omits_absent_fields() {
        let ok = serde_json::to_value(ToolOutcome::ok("t", json!({"a": 1}), 0.5)).unwrap();
        assert!(ok.get("error").is_none());
        assert_eq!(ok["result"]["a"], 1);

        let err = serde_json::to_value(ToolOutcome::failed("t", "boom", 0.0)).unwrap();
        assert!(err.get("result").is_none());
        assert_eq!(err["error"], "boom");
        assert_eq!(err["success"], false);
    }
}
