use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use transfer_tracker::RPC_URL_ENV;
use transfer_tracker::amount::format_units;
use transfer_tracker::config::{AppConfig, CONFIG_PATH, ChainPreset};
use transfer_tracker::fetcher::RetryingFetcher;
use transfer_tracker::gateway::JsonRpcGateway;
use transfer_tracker::monitor::{MonitorSettings, PollLoop, initial_checkpoint};
use transfer_tracker::reporter::{self, JsonlAlertSink};
use transfer_tracker::types::SimilarityPolicy;

#[derive(Parser)]
#[command(
    name = "tracker",
    about = "Flag addresses that repeat near-identical native-coin transfers"
)]
struct Args {
    /// Config file (defaults to ./config.toml when present, else the chain preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chain preset to use (overrides the config file)
    #[arg(long, value_enum)]
    chain: Option<ChainPreset>,

    /// JSON-RPC endpoint (overrides config and the RPC_URL environment variable)
    #[arg(long)]
    rpc_url: Option<Url>,

    /// Similarity policy: retrospective, incremental or count-only
    #[arg(long)]
    policy: Option<SimilarityPolicy>,

    /// First block to scan (defaults to the first block after startup)
    #[arg(long)]
    start_block: Option<u64>,

    /// File that raised alerts are appended to
    #[arg(long)]
    alerts_path: Option<PathBuf>,

    /// Write the effective config to the --config path (or config.toml) and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args)?;

    if args.init_config {
        let path = args.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
        config.save(&path)?;
        info!("Wrote config to {}", path.display());
        return Ok(());
    }

    let detector = config.detector_config()?;
    let retry = config.retry_policy()?;
    let poll_interval = config.poll_interval()?;
    let rpc_url = config.rpc_url()?;
    let alerts_path = config.alerts_path();

    info!(
        "Starting tracker ({}): rpc={} range={}..={} {} min_count={} epsilon={} policy={}",
        config.chain_label(),
        rpc_url.host_str().unwrap_or("?"),
        format_units(detector.min_value),
        format_units(detector.max_value),
        config.symbol(),
        detector.min_transfer_count,
        format_units(detector.similarity_epsilon),
        detector.policy,
    );
    info!("Alerts are appended to {}", alerts_path.display());

    let gateway = JsonRpcGateway::new(rpc_url, config.request_timeout())
        .context("failed to build RPC client")?;
    let fetcher = RetryingFetcher::new(retry);
    let checkpoint = initial_checkpoint(&gateway, &fetcher, config.chain.start_block)
        .await
        .context("failed to read the initial chain height")?;

    let settings = MonitorSettings {
        chain: config.chain_label().to_string(),
        symbol: config.symbol().to_string(),
        detector,
        retry,
    };
    let mut poll = PollLoop::new(gateway, JsonlAlertSink::new(alerts_path), settings, checkpoint);

    info!("Entering polling loop. Press Ctrl+C to stop.");
    let summary = poll.run(poll_interval, shutdown_signal()).await;

    reporter::report_exit_summary(&summary);
    info!("Program stopped.");
    Ok(())
}

/// Explicit `--config` must exist; otherwise `config.toml` is optional.
fn load_config(args: &Args) -> Result<AppConfig> {
    if let Some(path) = &args.config {
        if !args.init_config || path.exists() {
            let config = AppConfig::load(path)?;
            info!("Loaded config from {}", path.display());
            return Ok(config);
        }
    }

    let default_path = Path::new(CONFIG_PATH);
    if args.config.is_none() && default_path.exists() {
        let config = AppConfig::load(default_path)?;
        info!("Loaded config from {}", default_path.display());
        return Ok(config);
    }

    let preset = args.chain.unwrap_or_default();
    info!("No config file, using the '{}' preset", preset.label());
    Ok(AppConfig::for_preset(preset))
}

/// CLI flags win over the environment, which wins over the config file.
fn apply_overrides(config: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(chain) = args.chain {
        config.chain.preset = chain;
    }

    if let Some(url) = &args.rpc_url {
        config.chain.rpc_url = Some(url.clone());
    } else if let Ok(raw) = std::env::var(RPC_URL_ENV) {
        let url = Url::parse(raw.trim())
            .with_context(|| format!("{RPC_URL_ENV} is not a valid URL"))?;
        config.chain.rpc_url = Some(url);
    }

    if let Some(policy) = args.policy {
        let mut detector = config.detector_settings()?;
        detector.policy = policy;
        config.detector = Some(detector);
    }

    if let Some(block) = args.start_block {
        config.chain.start_block = Some(block);
    }

    if let Some(path) = &args.alerts_path {
        config.alerts.path = Some(path.clone());
    }

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
