//! CLI module — command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;

use sonarcare::agents::AgentRegistry;
use sonarcare::auth::DevIdentity;
use sonarcare::config::Config;
use sonarcare::delivery::DeliveryChannel;
use sonarcare::orchestrator::Orchestrator;
use sonarcare::reasoning::sonar::SonarBackend;
use sonarcare::server::{self, AppState};
use sonarcare::sessions::ConnectionRegistry;
use sonarcare::store::MemoryStore;

const DEFAULT_CONFIG_PATH: &str = "sonarcare.json";

#[derive(Parser)]
#[command(name = "sonarcare")]
#[command(version)]
#[command(about = "Medical-advice chatbot backend with multi-agent streaming", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Path to the JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration and agent wiring without serving
    Doctor {
        /// Path to the JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    // Honor a .env file before anything reads the environment.
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
        Some(Commands::Serve { host, port, config }) => cmd_serve(host, port, config).await,
        Some(Commands::Doctor { config }) => cmd_doctor(config),
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::load_from_path(&p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Config::load_from_path(default)?
            } else {
                Config::from_env()
            }
        }
    };
    Ok(config)
}

async fn cmd_serve(host: Option<String>, port: Option<u16>, config: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    let state = build_state(&config)?;
    info!(
        model = %config.backend.model,
        light_model = %config.backend.light_model,
        research_model = %config.backend.research_model,
        "sonarcare starting"
    );
    server::serve(&config, state).await?;
    Ok(())
}

fn cmd_doctor(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;

    let mut failures = 0usize;
    match config.validate() {
        Ok(()) => println!("[ok]  config: valid"),
        Err(e) => {
            println!("[ERR] config: {e}");
            failures += 1;
        }
    }

    let backend: Arc<dyn sonarcare::reasoning::ReasoningBackend> = Arc::new(SonarBackend::new(
        &config.backend.api_key,
        &config.backend.api_base,
        &config.backend.model,
    ));
    match AgentRegistry::build(&config.backend, backend) {
        Ok(registry) => println!("[ok]  agents: {} intents bound", registry.len()),
        Err(e) => {
            println!("[ERR] agents: {e}");
            failures += 1;
        }
    }

    println!(
        "[ok]  limits: reply {}s, chunk {}s, history window {}, dedup {} entries / {}s ttl",
        config.limits.reply_timeout_secs,
        config.limits.chunk_timeout_secs,
        config.limits.history_window,
        config.limits.dedup_capacity,
        config.limits.dedup_ttl_secs,
    );

    if failures > 0 {
        anyhow::bail!("{failures} check(s) failed");
    }
    println!("All checks passed.");
    Ok(())
}

fn build_state(config: &Config) -> Result<AppState> {
    let backend: Arc<dyn sonarcare::reasoning::ReasoningBackend> = Arc::new(SonarBackend::new(
        &config.backend.api_key,
        &config.backend.api_base,
        &config.backend.model,
    ));
    let registry = AgentRegistry::build(&config.backend, backend)?;

    let store: Arc<dyn sonarcare::store::SessionStore> = Arc::new(MemoryStore::new());
    let connections = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(DeliveryChannel::new(
        connections.clone(),
        std::time::Duration::from_secs(config.limits.dedup_ttl_secs),
        config.limits.dedup_capacity,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        registry,
        delivery.clone(),
        config.limits.clone(),
    ));

    Ok(AppState {
        store,
        connections,
        delivery,
        orchestrator,
        identity: Arc::new(DevIdentity::new()),
        started_at: Instant::now(),
    })
}
