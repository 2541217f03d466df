//! Assassin game server CLI.
//!
//! Subcommands:
//! - `run` - start the server (recovery, listener, operator queue)
//! - `rebuild` - destructively rebuild the store from chain, then exit
//! - `migrate` - open the store, apply migrations, exit

use std::sync::Arc;

use alloy::providers::Provider;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use assassin_server::chain::{ChainReader, ChainWriter};
use assassin_server::config::Settings;
use assassin_server::error::{Result, ServerError};
use assassin_server::fanout::ChannelBroadcaster;
use assassin_server::game::{GameDeps, GameManager};
use assassin_server::listener::{EventListener, rebuild};
use assassin_server::ports::store::Store;
use assassin_server::queue::OperatorQueue;
use assassin_server::store::SqliteStore;
use evm_operator::OperatorProvider;

/// Assassin game server.
#[derive(Parser, Debug)]
#[command(name = "assassin-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (optional; env vars override).
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the game server.
    Run,
    /// Wipe game tables and rebuild them from chain state, then exit.
    Rebuild,
    /// Apply store migrations, then exit.
    Migrate,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("assassin_server={level},evm_operator={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; environment may be set directly.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(&settings.logging.level);

    if let Err(errors) = settings.validate() {
        for message in &errors {
            error!(%message, "Invalid configuration");
        }
        std::process::exit(2);
    }

    let result = match cli.command {
        Commands::Run => run(settings).await,
        Commands::Rebuild => run_rebuild(settings).await,
        Commands::Migrate => run_migrate(settings).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Fatal error");
        std::process::exit(e.exit_code().unwrap_or(1));
    }
}

async fn run(settings: Settings) -> Result<()> {
    info!(version = assassin_server::VERSION, "Starting assassin game server");

    let store: Arc<SqliteStore> = Arc::new(SqliteStore::open(&settings.db.path).await?);
    let contract = settings
        .contract
        .parse()
        .map_err(ServerError::Config)?;

    let provider = OperatorProvider::connect(
        &settings.rpc.url,
        &settings.operator.private_key,
        settings.rpc.chain_id,
    )
    .await?;
    info!(operator = %provider.operator(), chain_id = provider.chain_id(), "Operator connected");

    let reader = ChainReader::new(provider.inner().clone(), contract);
    let writer = ChainWriter::new(provider, contract);

    let shutdown = CancellationToken::new();
    let (queue, queue_task) = OperatorQueue::spawn(
        Arc::clone(&store) as Arc<dyn Store>,
        writer,
        shutdown.clone(),
    );

    let deps = Arc::new(GameDeps {
        store: Arc::clone(&store) as Arc<dyn Store>,
        chain: Arc::new(reader.clone()),
        queue,
        broadcaster: Arc::new(ChannelBroadcaster::new()),
        settings: settings.game.clone(),
    });
    let manager = GameManager::new(deps, shutdown.clone());

    if settings.sync.rebuild_db {
        rebuild::rebuild_from_chain(store.as_ref(), &reader, settings.sync.start_game_id).await?;
    }
    manager.startup_recovery().await?;

    let listener = EventListener::new(
        &settings.rpc.ws_url,
        contract,
        Arc::clone(&store) as Arc<dyn assassin_server::ports::store::SyncStore>,
        Arc::clone(&manager) as Arc<dyn assassin_server::listener::ChainEventHandler>,
        settings.listener.clone(),
        shutdown.clone(),
    );
    let listener_task = tokio::spawn(listener.run());

    info!("Server running; press Ctrl-C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
        () = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    manager.stop_all();
    let _ = listener_task.await;
    let _ = queue_task.await;

    info!("Server stopped");
    Ok(())
}

async fn run_rebuild(settings: Settings) -> Result<()> {
    let store = SqliteStore::open(&settings.db.path).await?;
    let contract = settings
        .contract
        .parse()
        .map_err(ServerError::Config)?;

    let url: alloy::transports::http::reqwest::Url = settings
        .rpc
        .url
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid rpc.url: {e}")))?;
    let provider = alloy::providers::ProviderBuilder::default()
        .connect_http(url)
        .erased();
    let reader = ChainReader::new(provider, contract);

    let loaded =
        rebuild::rebuild_from_chain(&store, &reader, settings.sync.start_game_id).await?;
    info!(games = loaded, "Rebuild finished");
    Ok(())
}

async fn run_migrate(settings: Settings) -> Result<()> {
    // Migrations run on open.
    let _store = SqliteStore::open(&settings.db.path).await?;
    info!(path = %settings.db.path, "Store migrated");
    Ok(())
}
