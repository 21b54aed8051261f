use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use turnstile_core::{
    backend::{BackendSet, HealthMonitor, HealthTable, HttpClient, Mode},
    config::AppConfig,
    invalidation::LoggingSink,
    registry::ContractRegistry,
    runtime::SyncRuntime,
    subscription::SessionState,
    types::Address,
};

#[derive(Parser)]
#[command(name = "turnstile")]
#[command(about = "Keeps a ticketing cache in sync with the ledger")]
struct Cli {
    /// Configuration file (TOML). Falls back to `TURNSTILE_CONFIG`, then `config/config.toml`.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync runtime until interrupted
    Run {
        /// Viewer address to watch for holdings changes
        #[arg(long)]
        viewer: Option<String>,
    },

    /// Validate configuration and probe every backend once
    Check,
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.logging.level.as_str();
        EnvFilter::new(format!("warn,turnstile_core={level},turnstile={level}"))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {e:?}"))?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Commands::Run { viewer } => run(config, viewer).await,
        Commands::Check => check(config).await,
    }
}

async fn run(config: AppConfig, viewer: Option<String>) -> Result<()> {
    info!(
        backends = config.backends.len(),
        contracts = config.contracts.len(),
        polling_interval_secs = config.polling.interval_seconds,
        "configuration loaded"
    );

    let viewer = viewer
        .as_deref()
        .map(str::parse::<Address>)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --viewer: {e}"))?;

    let runtime = SyncRuntime::builder()
        .with_config(config)
        .with_sink(Arc::new(LoggingSink))
        .build()
        .context("failed to start runtime")?;

    if let Some(address) = viewer {
        runtime.components().viewer().bind(address);
        info!(viewer = %address, "viewer bound");
    }

    let mut status_rx = runtime.components().status().subscribe();
    let status_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            match status.status {
                SessionState::Error => error!(
                    error = status.meta.error.as_deref().unwrap_or("unknown"),
                    "push subscription gave up, relying on polling"
                ),
                state => info!(status = %state, attempt = status.meta.attempt, "push subscription"),
            }
        }
    });

    shutdown_signal().await;
    runtime.shutdown().await;
    status_task.abort();
    Ok(())
}

async fn check(config: AppConfig) -> Result<()> {
    let registry = ContractRegistry::from_config(&config.contracts)
        .context("contract registry is invalid")?;
    println!("contracts: {}", registry.len());

    let http_client = Arc::new(HttpClient::new().context("failed to build HTTP client")?);
    let backends = Arc::new(BackendSet::from_config(&config.backends, &http_client));
    let table = Arc::new(HealthTable::new());
    let monitor = HealthMonitor::new(backends.clone(), table.clone(), config.health.clone());

    let mode = monitor.check_all_now().await;
    for backend in backends.iter() {
        let health = table.get(backend.name());
        println!(
            "{:<16} {:<12} latency={:<8} block={}",
            backend.name(),
            format!("{:?}", health.status).to_lowercase(),
            health.latency_ms.map_or_else(|| "-".to_string(), |ms| format!("{ms}ms")),
            health.latest_block.map_or_else(|| "-".to_string(), |b| b.to_string()),
        );
    }
    println!("mode: {}", mode.as_str());

    if mode == Mode::AllUnreachable {
        warn!("no backend answered the probe");
        anyhow::bail!("all backends unreachable");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
