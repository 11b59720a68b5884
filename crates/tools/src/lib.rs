//! Food assistant tools and the registry that dispatches them.
//!
//! Six built-in tools cover recommendations, recipes, dish images, weather,
//! nearby restaurants and web search. The registry validates each call,
//! applies per-tool rate limits and records execution stats.

pub mod amap_search;
pub mod bing_search;
pub mod food_recommendation;
pub mod image_search;
pub mod rate_limit;
pub mod recipe_generator;
pub mod registry;
pub mod weather_api;

use std::sync::Arc;

use shihui_config::AppConfig;
use shihui_core::error::ToolError;
use shihui_providers::ModelRouter;
use tracing::info;

pub use registry::{ExecutionStats, PlanResults, ToolInfo, ToolRegistry, ToolStats, ToolStatus};

/// Build a registry with every built-in tool.
///
/// API keys, rate-limit overrides and the disabled list come from `config`.
/// Tools whose key is missing stay registered and fail at call time.
pub fn default_registry(config: &AppConfig, router: Arc<ModelRouter>) -> Result<ToolRegistry, ToolError> {
    let tools = &config.tools;
    let mut weather = weather_api::WeatherApiTool::new(tools.openweather_api_key.clone());
    if let Some(city) = tools.default_city.as_deref().filter(|c| !c.is_empty()) {
        weather = weather.with_default_city(city);
    }

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(amap_search::AmapSearchTool::new(tools.amap_api_key.clone())))?;
    registry.register(Arc::new(bing_search::BingSearchTool::new(tools.bing_api_key.clone())))?;
    registry.register(Arc::new(weather))?;
    registry.register(Arc::new(food_recommendation::FoodRecommendationTool))?;
    registry.register(Arc::new(image_search::ImageSearchTool::new()))?;
    registry.register(Arc::new(recipe_generator::RecipeGeneratorTool::new(router)))?;

    for (name, limit) in &tools.rate_limits {
        registry.set_rate_limit(name, Some(*limit))?;
    }
    for name in &tools.disabled {
        registry.disable_tool(name)?;
    }

    info!(
        tools = registry.available_tools().len(),
        disabled = tools.disabled.len(),
        "Tool registry ready"
    );
    Ok(registry)
}
