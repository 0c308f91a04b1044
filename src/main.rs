use anyhow::Context;
use clap::Parser;
use nfs_volume::config::{Config, LogConfig, Overrides};
use nfs_volume::driver::{DriverMetrics, Mounter, NfsDriver, SystemRunner, VolumeRegistry};
use nfs_volume::plugin::PluginServer;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Docker volume plugin mounting NFS exports
#[derive(Debug, Parser)]
#[command(name = "nfs-volume", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "NFS_VOLUME_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory for mountpoints
    #[arg(long)]
    root: Option<PathBuf>,

    /// NFS major version (3 or 4)
    #[arg(long)]
    nfs_version: Option<u8>,

    /// Default mount options for volumes without `nfsopts`
    #[arg(long)]
    nfs_opts: Option<String>,

    /// Plugin socket path
    #[arg(long)]
    socket: Option<PathBuf>,
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.filter.as_str().into());

    let writer = match &log.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt = tracing_subscriber::fmt::layer().with_writer(writer);
    if log.json {
        tracing_subscriber::registry().with(filter).with(fmt.json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down volume plugin");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        root: cli.root,
        nfs_version: cli.nfs_version,
        nfs_opts: cli.nfs_opts,
        socket: cli.socket,
    };

    let config = Config::load_with(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    init_tracing(&config.log)?;

    tracing::info!(
        root = %config.root.display(),
        nfs_version = %config.version(),
        "Starting NFS volume plugin"
    );

    let runner = Arc::new(SystemRunner::new(config.command_timeout()));
    let mounter = Mounter::new(runner, config.version(), config.nfs_opts.as_deref())
        .with_verbose(config.mount_verbose(tracing::enabled!(tracing::Level::DEBUG)))
        .with_mount_table(&config.mount_table);

    let registry = Arc::new(VolumeRegistry::new(&config.root));
    let metrics = Arc::new(DriverMetrics::new(Arc::new(prometheus::Registry::new()))?);
    let driver = Arc::new(NfsDriver::new(registry, mounter).with_metrics(metrics.clone()));

    PluginServer::new(driver).with_metrics(metrics).serve(&config.socket, shutdown_signal()).await
}
