//! `shihui config` — Configuration management commands.

use shihui_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            let keyed = config
                .models
                .values()
                .filter(|m| m.enabled && m.api_key.is_some())
                .count();
            if keyed == 0 {
                warnings.push("No model has an API key (set DEEPSEEK_API_KEY)".to_string());
            }
            for (name, key) in [
                ("amap_search", &config.tools.amap_api_key),
                ("bing_search", &config.tools.bing_api_key),
                ("weather_api", &config.tools.openweather_api_key),
            ] {
                if key.is_none() {
                    warnings.push(format!("{name} has no API key and will fail at call time"));
                }
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:     {}", config.default_model);
            println!("   Persona:   {}", config.agent.persona);
            println!("   Memory:    {}", config.memory.backend);
            println!("   Disabled:  {}", config.tools.disabled.join(", "));
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = shihui_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }
}
