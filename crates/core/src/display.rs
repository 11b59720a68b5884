//! Display envelopes: the uniform, presentation-ready shape of tool results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    ImageGallery,
    RecommendationCards,
    RecipeDetailed,
    LocationList,
    WeatherCard,
    SearchResults,
    SimpleText,
    Error,
}

/// A tool result normalized for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEnvelope {
    pub tool_name: String,
    pub display_type: DisplayType,
    pub display_config: serde_json::Value,
    pub display_data: serde_json::Value,
}

impl DisplayEnvelope {
    /// Read an envelope already present in a payload.
    ///
    /// Returns `None` unless `display_type` is a known variant and
    /// `display_data` is present.
    pub fn from_payload(tool_name: &str, payload: &serde_json::Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let display_type: DisplayType =
            serde_json::from_value(obj.get("display_type")?.clone()).ok()?;
        let display_data = obj.get("display_data")?.clone();
        Some(Self {
            tool_name: obj
                .get("tool_name")
                .and_then(|v| v.as_str())
                .unwrap_or(tool_name)
                .to_string(),
            display_type,
            display_config: obj
                .get("display_config")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
            display_data,
        })
    }
}
