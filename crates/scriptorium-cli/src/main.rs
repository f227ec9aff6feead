use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scriptorium_provider::{GeminiProvider, StubProvider, TextProvider};
use scriptorium_server::state::AppState;
use scriptorium_store::Store;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "scriptorium", version, about = "Drama script co-writing backend")]
struct Cli {
    #[arg(
        long,
        default_value = "scriptorium.yaml",
        help = "Path to the config file"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP API server")]
    Serve,
    #[command(about = "Write a config template and create the database")]
    Init,
    #[command(about = "Validate the config file")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve(&cli.config).await,
        Commands::Init => init(&cli.config),
        Commands::Validate => validate(&cli.config),
    }
}

async fn serve(config_path: &PathBuf) -> Result<()> {
    let config = Config::load(config_path)?;
    let store = Store::open(&config.database)?;

    let provider: Arc<dyn TextProvider> = if config.provider.api_key.is_empty() {
        tracing::warn!("no api key configured, using the stub provider");
        Arc::new(StubProvider::new())
    } else {
        let mut gemini = GeminiProvider::new(config.provider.api_key.clone());
        if let Some(model) = &config.provider.model {
            gemini = gemini.with_model(model.clone());
        }
        Arc::new(gemini)
    };

    let state = AppState::new(store, provider);
    scriptorium_server::serve(state, &config.server.addr).await
}

fn init(config_path: &PathBuf) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("config file {} already exists", config_path.display());
    }
    Config::write_template(config_path)?;
    let config = Config::load(config_path)?;
    Store::open(&config.database)?;
    println!("wrote {} and created {}", config_path.display(), config.database);
    Ok(())
}

fn validate(config_path: &PathBuf) -> Result<()> {
    let config = Config::load(config_path)?;
    if config.provider.api_key.is_empty() {
        println!("warning: provider.api_key is empty, serve will use the stub provider");
    }
    println!("{} is valid", config_path.display());
    Ok(())
}
