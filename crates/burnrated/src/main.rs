//! burnrated — the burnrate daemon.
//!
//! Serves the CPU-burn API that autoscaling demos point load at, and can
//! drive that load itself.
//!
//! # Usage
//!
//! ```text
//! burnrated serve --port 8080 --source local
//! burnrated drive --target http://backend:8080 --users 20 --work-ms 2000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use burnrate_api::{ApiState, build_router};
use burnrate_core::BurnrateConfig;
use burnrate_core::config::SourceKind;
use burnrate_driver::{DriverConfig, LoadDriver};

#[derive(Parser)]
#[command(name = "burnrated", about = "CPU-burn service for autoscaling demos")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// TOML configuration file. Defaults apply without one.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (overrides the config file).
        #[arg(long)]
        bind: Option<String>,

        /// Directory of static files served for unmatched paths.
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Utilization source: local, cluster-api, kubectl, node-agent.
        #[arg(long)]
        source: Option<SourceKind>,
    },

    /// Generate load against a running service.
    Drive {
        /// Base URL of the service.
        #[arg(long)]
        target: String,

        /// Concurrent simulated users.
        #[arg(long, default_value = "10")]
        users: u64,

        /// Milliseconds of CPU each request asks for.
        #[arg(long, default_value = "2000")]
        work_ms: u64,

        /// Stop after this many seconds. Runs until Ctrl-C when omitted.
        #[arg(long)]
        duration: Option<u64>,

        /// Tick interval in milliseconds.
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Command::Serve {
            config,
            port,
            bind,
            static_dir,
            source,
        } => {
            let mut config = match config {
                Some(path) => BurnrateConfig::from_file(&path)?,
                None => BurnrateConfig::default(),
            };
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(dir) = static_dir {
                config.server.static_dir = Some(dir);
            }
            if let Some(source) = source {
                config.utilization.source = source;
            }
            config.validate()?;
            run_server(config).await
        }
        Command::Drive {
            target,
            users,
            work_ms,
            duration,
            interval_ms,
        } => {
            let config = DriverConfig {
                target,
                users,
                work_ms,
                duration: duration.map(Duration::from_secs),
                interval: Duration::from_millis(interval_ms),
                ..Default::default()
            };
            run_driver(config).await
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,burnrated=debug,burnrate=debug")
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

async fn run_server(config: BurnrateConfig) -> anyhow::Result<()> {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    info!(cores, "burnrate starting");

    let source = burnrate_metrics::build_source(&config.utilization)?;
    let state = ApiState::new(source, config.compute);

    let static_dir = config.server.static_dir.as_deref();
    if let Some(dir) = static_dir {
        if dir.is_dir() {
            info!(dir = %dir.display(), "serving static files");
        } else {
            warn!(dir = %dir.display(), "static directory not found; unmatched paths will 404");
        }
    }
    let router = build_router(state, static_dir);

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("burnrate stopped");
    Ok(())
}

async fn run_driver(config: DriverConfig) -> anyhow::Result<()> {
    let driver = LoadDriver::new(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let summary = driver.run(shutdown_rx).await;
    if summary.completed == 0 && summary.errors > 0 {
        anyhow::bail!("no request succeeded ({} errors)", summary.errors);
    }
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
