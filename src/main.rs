use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchroom_lens::config::AppConfig;
use matchroom_lens::fetch::{EnvTokenSource, MatchApi, RemoteClient};
use matchroom_lens::lobby::Matchroom;
use matchroom_lens::options::RangeOptionStore;
use matchroom_lens::overlay::MemoryHost;
use matchroom_lens::pipeline;
use matchroom_lens::resolve::{HostPage, LobbyResolver};
use matchroom_lens::storage::JsonlStorage;

#[derive(Parser)]
#[command(name = "matchroom-lens")]
#[command(about = "Lobby observation and statistics aggregation for match-room overlays")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a saved lobby page and print its snapshot
    Resolve {
        /// Saved HTML of the lobby page
        #[arg(long)]
        page: PathBuf,

        /// URL the page was loaded from
        #[arg(long)]
        url: String,
    },

    /// Compute metrics for a match with the persisted range options
    Compute {
        #[arg(long)]
        match_id: String,
    },

    /// Inspect or change persisted range options
    Options {
        #[command(subcommand)]
        action: OptionsAction,
    },

    /// Run one resolve, compute and mount cycle and print the overlays
    Render {
        /// Saved HTML of the lobby page
        #[arg(long)]
        page: PathBuf,

        /// URL the page was loaded from
        #[arg(long)]
        url: String,
    },
}

#[derive(Subcommand)]
enum OptionsAction {
    /// Print the current range options
    Show,

    /// Set one field (matchCount, playerMin, timeSpan)
    Set { field: String, value: String },
}

fn api_from(config: &AppConfig) -> Result<MatchApi> {
    let tokens = Arc::new(EnvTokenSource::new(&config.client.session_token_env));
    let client = RemoteClient::with_reqwest(config.client.to_fetcher_config(), tokens)
        .context("Failed to build HTTP client")?;
    Ok(MatchApi::new(client, &config.client.game))
}

fn options_from(config: &AppConfig) -> (JsonlStorage, RangeOptionStore) {
    let storage = JsonlStorage::new(&config.storage.options_path);
    let options = RangeOptionStore::new(&config.lobby.range_namespace, Arc::new(storage.clone()));
    (storage, options)
}

fn read_page(path: &Path, url: String) -> Result<HostPage> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read page {}", path.display()))?;
    Ok(HostPage::new(url, html))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("Starting matchroom-lens v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Resolve { page, url } => {
            let page = read_page(&page, url)?;
            let resolver = LobbyResolver::new(api_from(&config)?);

            match resolver.resolve(&page).await {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("not ready"),
            }
        }

        Commands::Compute { match_id } => {
            let api = api_from(&config)?;
            let (_, options) = options_from(&config);
            let range = options.range_options().await?;
            tracing::info!("Computing {} with {:?}", match_id, range);

            match pipeline::compute(&api, &match_id, &range).await {
                Some(metrics) => println!("{}", serde_json::to_string_pretty(&metrics)?),
                None => {
                    let reason = api.client().last_error().unwrap_or_else(|| "unknown".to_string());
                    anyhow::bail!("No metrics for {}: {}", match_id, reason);
                }
            }
        }

        Commands::Options { action } => {
            let (storage, options) = options_from(&config);
            match action {
                OptionsAction::Show => {
                    let range = options.range_options().await?;
                    println!("{}", serde_json::to_string_pretty(&range)?);
                }
                OptionsAction::Set { field, value } => {
                    let changed = options.set_raw(&field, &value).await?;
                    if changed {
                        let kept = storage.compact()?;
                        tracing::debug!("Compacted option log to {} records", kept);
                        println!("{} = {}", field, value);
                    } else {
                        println!("{} unchanged", field);
                    }
                }
            }
        }

        Commands::Render { page, url } => {
            let page = read_page(&page, url)?;
            let api = api_from(&config)?;
            let (_, options) = options_from(&config);
            let host = Arc::new(MemoryHost::new(page));

            let room = Matchroom::new(api, host.clone(), options, config.lobby.render_debounce());
            if !room.render_once().await {
                println!("not ready");
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&host.fragments())?);
        }
    }

    Ok(())
}
