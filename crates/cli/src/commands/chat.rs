//! `shihui chat` — Interactive or single-message chat mode.

use std::io::Write;

use shihui_agent::{FoodAgent, ThinkingEvent, TurnRequest};
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct ChatOptions {
    pub user: String,
    pub session: String,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub location: Option<String>,
    pub stream: bool,
}

impl ChatOptions {
    fn request(&self, message: &str) -> TurnRequest {
        let mut request = TurnRequest::new(message).for_session(&self.user, &self.session);
        if let Some(tools) = &self.tools {
            request = request.with_tools(tools.iter().cloned());
        }
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }
        if let Some(location) = &self.location {
            request = request.with_location(location);
        }
        request
    }
}

pub async fn run(message: Option<String>, options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent) = super::load_agent()?;

    if agent.router().is_empty() {
        eprintln!();
        eprintln!("  WARNING: No model API key configured; replies will be apologies.");
        eprintln!("  Set DEEPSEEK_API_KEY or add api_key under [models.<id>] in:");
        eprintln!("    {}", shihui_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
    }

    if let Some(msg) = message {
        // Single message mode
        respond(&agent, &options, &msg).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         食慧 Shihui — Interactive Mode        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", options.model.as_deref().unwrap_or(&config.default_model));
    println!("  Tools:     {}", agent.registry().available_tools().join(", "));
    println!("  Memory:    {}", config.memory.backend);
    println!("  Session:   {}/{}", options.user, options.session);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if !line.is_empty() {
            respond(&agent, &options, line).await?;
        }
        prompt()?;
    }

    println!();
    println!("  再见！Goodbye! 👋");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

async fn respond(agent: &FoodAgent, options: &ChatOptions, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let request = options.request(message);

    if options.stream {
        let mut rx = agent.stream_message(request);
        while let Some(event) = rx.recv().await {
            println!("{}", serde_json::to_string(&event)?);
            if let ThinkingEvent::Error { content } = &event {
                tracing::warn!(error = %content, "Streamed turn ended with an error");
            }
        }
        return Ok(());
    }

    eprint!("  Thinking...");
    let response = agent.process_message(request).await;
    eprint!("\r              \r");
    println!();
    for line in response.response.lines() {
        println!("  食慧 > {line}");
    }
    if !response.tools_used.is_empty() {
        println!("  [tools: {}]", response.tools_used.join(", "));
    }
    println!();
    Ok(())
}
