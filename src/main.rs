use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use querymate_core::config::{self, Config};
use querymate_core::service::http::{serve, AppState};

#[derive(Parser)]
#[command(
    name = "querymate",
    about = "QueryMate - embeddable context-grounded chatbot backend",
    version = querymate_core::VERSION,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
        /// Path to config file (default: ~/.querymate/config.json)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },
    /// Initialize querymate configuration and data directory
    Onboard,
    /// Show querymate status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("querymate=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, config } => cmd_serve(host, port, config).await?,
        Commands::Onboard => cmd_onboard()?,
        Commands::Status => cmd_status()?,
    }

    Ok(())
}

// ====== Commands ======

async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let mut cfg = config::load_config(config_path.as_deref());
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let state = Arc::new(AppState::from_config(cfg));

    println!("Starting QueryMate API on {}...", addr);
    serve(&addr, state).await
}

fn cmd_onboard() -> Result<()> {
    let config_path = config::get_config_path();

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        println!("Delete it first to re-onboard.");
        return Ok(());
    }

    let cfg = Config::default();
    config::save_config(&cfg, None)?;
    println!("Created config at {}", config_path.display());

    let data_dir = cfg.storage.data_path();
    std::fs::create_dir_all(data_dir.join("accounts"))?;
    std::fs::create_dir_all(data_dir.join("sessions"))?;
    println!("Created data directory at {}", data_dir.display());

    println!("\nQueryMate is ready!");
    println!("\nNext steps:");
    println!("  1. Add your Gemini API key to {} (or set GEMINI_API_KEY)", config_path.display());
    println!("  2. Start the server: querymate serve");
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config_path = config::get_config_path();
    let cfg = config::load_config(None);
    let data_dir = cfg.storage.data_path();

    println!("QueryMate Status\n");

    let config_exists = config_path.exists();
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗" }
    );
    println!(
        "Data dir: {} {}",
        data_dir.display(),
        if data_dir.exists() { "✓" } else { "✗" }
    );
    println!(
        "Gemini API: {}",
        if cfg.gemini.api_key.is_empty() {
            "not set"
        } else {
            "✓"
        }
    );
    println!("Collection models: {}", cfg.models.collection.join(", "));
    println!("Answering models: {}", cfg.models.answering.join(", "));
    println!("Listen: {}:{}", cfg.server.host, cfg.server.port);

    Ok(())
}
