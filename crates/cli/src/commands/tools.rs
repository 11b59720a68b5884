//! `shihui tools` — List registered tools.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (_, agent) = super::load_agent()?;
    let registry = agent.registry();

    println!("🍳 Shihui Tools");
    println!("===============");
    println!();
    for info in registry.list_tools() {
        let meta = &info.metadata;
        let status = if meta.enabled { "✅" } else { "⛔" };
        println!("  {status} {:<20} [{}] {}", meta.name, meta.category.as_str(), meta.description);
        let required: Vec<&str> = meta.parameters.required_names().collect();
        if !required.is_empty() {
            println!("       required: {}", required.join(", "));
        }
        if let Some(limit) = meta.rate_limit {
            println!("       rate limit: {limit}/min");
        }
    }

    let stats = registry.execution_stats();
    println!();
    println!("  {} registered, {} enabled", stats.total_tools, stats.enabled_tools);
    Ok(())
}
