//! switchboard - an agentic query router over MCP tool servers.
//!
//! Usage:
//!   switchboard serve        Start the HTTP query endpoint
//!   switchboard tools        Discover configured servers and print their tools
//!
//! Configuration comes from a TOML file (see --config). A few environment
//! variables override it: SWITCHBOARD_HOST, SWITCHBOARD_PORT,
//! SWITCHBOARD_MAX_TURNS, SWITCHBOARD_TOOL_TIMEOUT_SECS and GROQ_API_KEY.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use switchboard::server;
use switchboard::{
    AppConfig, GroqClient, QueryRouter, Result, SwitchboardError, ToolRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Route natural-language queries through a model that can call MCP tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file.
    #[arg(long, default_value = "switchboard.toml")]
    config: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP query endpoint.
    Serve,

    /// Discover the configured tool servers and print what they offer.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config = AppConfig::from_env_or_file(&cli.config)?;

    match cli.command {
        Commands::Serve => cmd_serve(config).await,
        Commands::Tools => cmd_tools(config).await,
    }
}

async fn cmd_serve(config: AppConfig) -> Result<()> {
    let model = build_model(&config)?;

    let registry = ToolRegistry::discover(&config.mcp_servers, config.router.tool_timeout()).await;
    info!(
        tools = registry.len(),
        unreachable = registry.unreachable().len(),
        "tool discovery complete"
    );

    let router = QueryRouter::new(Arc::new(model), Arc::new(registry))
        .with_max_model_turns(config.router.max_model_turns);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|err| SwitchboardError::Config(format!("invalid listen address: {err}")))?;

    server::serve(Arc::new(router), addr).await
}

async fn cmd_tools(config: AppConfig) -> Result<()> {
    let registry = ToolRegistry::discover(&config.mcp_servers, config.router.tool_timeout()).await;

    for descriptor in registry.descriptors() {
        println!("{} (server: {})", descriptor.name, descriptor.server);
        println!("  {}", descriptor.description);
        println!("  {}", descriptor.schema.to_json_schema());
    }
    for err in registry.unreachable() {
        println!("unreachable: {err}");
    }
    if registry.is_empty() && registry.unreachable().is_empty() {
        println!("no tool servers configured");
    }
    Ok(())
}

fn build_model(config: &AppConfig) -> Result<GroqClient> {
    match config.model.provider.as_str() {
        "groq" => GroqClient::from_config(&config.model),
        other => Err(SwitchboardError::Config(format!(
            "unsupported model provider `{other}`"
        ))),
    }
}
