//! `shihui models` — List configured completion models.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent) = super::load_agent()?;
    let router = agent.router();

    println!("🤖 Shihui Models");
    println!("================");
    println!();
    for (id, model) in &config.models {
        let default = if *id == config.default_model { " (default)" } else { "" };
        let ready = router.list().any(|route| route.id == *id);
        let status = match (model.enabled, ready) {
            (false, _) => "disabled",
            (true, true) => "ready",
            (true, false) => "no API key",
        };
        println!("  {id:<12} {:<16} {:<20} {status}{default}", model.name, model.model);
    }
    println!();
    println!("  Environment: SHIHUI_MODEL, DEEPSEEK_API_KEY");
    Ok(())
}
