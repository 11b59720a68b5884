pub mod chat;
pub mod config_cmd;
pub mod models;
pub mod tools;

use shihui_agent::FoodAgent;
use shihui_config::AppConfig;

/// Load the configuration and build the agent from it.
pub fn load_agent() -> Result<(AppConfig, FoodAgent), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let agent = FoodAgent::from_config(&config)?;
    Ok((config, agent))
}
