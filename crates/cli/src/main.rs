//! Shihui CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive or single-message chat with the food assistant
//! - `tools`  — List registered tools and their status
//! - `models` — List configured completion models
//! - `config` — Show, locate or validate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shihui",
    about = "Shihui — food assistant agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the food assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        #[arg(long, default_value = "default")]
        user: String,

        #[arg(long, default_value = "cli")]
        session: String,

        /// Model id; the configured default when omitted
        #[arg(long)]
        model: Option<String>,

        /// Comma-separated tools to allow (all when omitted)
        #[arg(long, value_delimiter = ',')]
        tools: Option<Vec<String>>,

        /// Your city, passed to the assistant as context
        #[arg(long)]
        location: Option<String>,

        /// Print the thinking chain as JSON lines
        #[arg(long)]
        stream: bool,
    },

    /// List tools and their execution counts
    Tools,

    /// List configured models
    Models,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable in --stream mode.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { message, user, session, model, tools, location, stream } => {
            let options = commands::chat::ChatOptions { user, session, model, tools, location, stream };
            commands::chat::run(message, options).await?
        }
        Commands::Tools => commands::tools::run().await?,
        Commands::Models => commands::models::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
