use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tokio::sync::RwLock;

use burnmint_relayer::config::{Config, LogFormat};
use burnmint_relayer::db::{CursorStore, MemoryCursorStore, PgCursorStore};
use burnmint_relayer::invocation::{run_event_triggered, run_poll};
use burnmint_relayer::metrics;
use burnmint_relayer::server::{self, RelayerStats, SharedStats};
use burnmint_relayer::types::ExecutionResult;
use burnmint_relayer::watcher::{BurnWatcher, EvmLogSource};
use burnmint_relayer::writers::GelatoMintSubmitter;

#[derive(Parser)]
#[command(name = "burnmint-relayer")]
#[command(about = "Relays burns on one testnet as sponsored mints on the other", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Environment file loaded before reading settings
    #[arg(long, global = true, default_value = ".env")]
    env_file: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for burns once, relay them and persist the cursor
    Run,

    /// Relay the burn in a single JSON-encoded log (no cursor is touched)
    RelayLog {
        /// Read the log from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Poll on an interval and serve health/metrics
    Watch,

    /// Clear the stored cursor, or set it to a block
    ResetCursor {
        /// Block to store; the cursor is removed when omitted
        #[arg(long)]
        block: Option<u64>,
    },
}

fn main() -> Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = Config::load_from_file(&cli.env_file)?;
    init_logging(config.log_format);

    tracing::info!(
        source_chain = %config.source_chain,
        mint_chain = %config.mint_chain(),
        burn_contract = %config.burn_endpoint().contract_address,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Run => {
            let store = PgCursorStore::connect(config.database_url()?).await?;
            let watcher = burn_watcher(&config)?;
            let submitter = GelatoMintSubmitter::new(config.mint_endpoint(), &config.relay)?;

            let outcome = run_poll(&watcher, &submitter, &store).await?;
            print_result(&outcome.result())?;
        }
        Commands::RelayLog { file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .wrap_err_with(|| format!("Failed to read log from {}", path.display()))?,
                None => {
                    let mut raw = String::new();
                    std::io::stdin()
                        .read_to_string(&mut raw)
                        .wrap_err("Failed to read log from stdin")?;
                    raw
                }
            };
            let log: Log = serde_json::from_str(&raw).wrap_err("Failed to parse chain log")?;

            let burn_contract = Address::from_str(&config.burn_endpoint().contract_address)
                .wrap_err("Invalid burn contract address")?;
            let submitter =
                GelatoMintSubmitter::new(config.event_mint_endpoint(), &config.relay)?;

            let outcome =
                run_event_triggered(&log, burn_contract, config.source_chain, &submitter).await;
            print_result(&outcome.result())?;
        }
        Commands::Watch => watch(&config).await?,
        Commands::ResetCursor { block } => {
            let store = PgCursorStore::connect(config.database_url()?).await?;
            let key = config.source_chain.storage_key();
            match block {
                Some(block) => {
                    store.save(key, block).await?;
                    tracing::info!(key, block, "Cursor set");
                }
                None => {
                    store.clear(key).await?;
                    tracing::info!(key, "Cursor cleared");
                }
            }
        }
    }

    Ok(())
}

/// Run polling invocations until SIGINT/SIGTERM
async fn watch(config: &Config) -> Result<()> {
    let store: Box<dyn CursorStore> = match config.database {
        Some(ref db) => Box::new(PgCursorStore::connect(&db.url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, cursor is kept in memory only");
            Box::new(MemoryCursorStore::new())
        }
    };
    let watcher = burn_watcher(config)?;
    let submitter = GelatoMintSubmitter::new(config.mint_endpoint(), &config.relay)?;
    let chain = config.source_chain;

    let stats: SharedStats = Arc::new(RwLock::new(RelayerStats {
        source_chain: chain.to_string(),
        mint_chain: config.mint_chain().to_string(),
        relayer_address: submitter.relayer_address().to_string(),
        ..Default::default()
    }));

    let health_port = config.watch.health_port;
    let server_stats = stats.clone();
    tokio::spawn(async move {
        if let Err(e) = server::start_server("0.0.0.0", health_port, server_stats).await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let mut interval = tokio::time::interval(Duration::from_millis(config.watch.poll_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!(
        poll_interval_ms = config.watch.poll_interval_ms,
        "Watching for burns"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        match run_poll(&watcher, &submitter, store.as_ref()).await {
            Ok(outcome) => {
                let result = outcome.result();
                tracing::info!(can_exec = result.can_exec, "{}", result.message);
                stats.write().await.record(&outcome);
            }
            Err(e) => {
                metrics::record_error(chain.as_str(), "cursor_store");
                tracing::error!(error = ?e, "Invocation failed");
            }
        }
    }

    metrics::UP.set(0.0);
    tracing::info!("Burn/mint relayer stopped");
    Ok(())
}

fn burn_watcher(config: &Config) -> Result<BurnWatcher<EvmLogSource>> {
    let endpoint = config.burn_endpoint();
    let source = EvmLogSource::new(&endpoint.rpc_url, &endpoint.contract_address)?;
    Ok(BurnWatcher::new(source, config.scan, config.source_chain))
}

fn print_result(result: &ExecutionResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// Initialize tracing/logging with structured output on stderr
fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,burnmint_relayer=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if format == LogFormat::Json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
