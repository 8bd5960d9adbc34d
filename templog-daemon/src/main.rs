use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use templog_core::{
    change_queue, init_observability, paths, Config, IngestCoordinator, IngestStats, SensorStore,
};
use tokio::task::JoinHandle;
use tracing::{error, info};

mod shutdown;
mod watcher;

/// Watch logger directories and import every finished log file.
#[derive(Parser, Debug)]
#[command(name = "templogd")]
#[command(version, about = "Temperature logger ingestion daemon", long_about = None)]
struct Cli {
    /// Directories the loggers write into
    watch_dirs: Vec<PathBuf>,

    /// Configuration file (defaults to ~/.templog/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Pending changes held before watchers block
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Import files already present in the watched directories
    #[arg(long)]
    scan_existing: bool,
}

impl Cli {
    /// Command-line values override the configuration file.
    fn into_config(self) -> Result<Config> {
        let path = self.config.unwrap_or_else(paths::config_path);
        let mut config = Config::load(&path)?;

        if !self.watch_dirs.is_empty() {
            config.watch_dirs = self.watch_dirs;
        }
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if self.metrics_addr.is_some() {
            config.metrics_addr = self.metrics_addr;
        }
        config.scan_existing |= self.scan_existing;

        config.validate()?;
        if config.watch_dirs.is_empty() {
            bail!("at least one directory to watch is required");
        }
        Ok(config)
    }
}

/// Wait for the coordinator. A panic is logged so shutdown still closes the store.
async fn join_coordinator(handle: JoinHandle<IngestStats>) -> IngestStats {
    match handle.await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Ingestion coordinator failed: {}", e);
            IngestStats::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;

    init_observability(&config.log_level, config.metrics_addr).map_err(|e| anyhow!(e))?;
    info!("templogd {} starting", env!("CARGO_PKG_VERSION"));

    info!("Opening database at {}", config.db_path.display());
    let store = SensorStore::open(&config.db_path, &config.store_options())
        .await
        .with_context(|| format!("Error opening database {}", config.db_path.display()))?;
    info!("Known sensors: {}", store.tables().await.len());

    // Subscribe every listener before anything can signal.
    let shutdown = shutdown::shutdown_signal();
    let (notifier, queue) = change_queue(config.queue_capacity);

    let coordinator =
        tokio::spawn(IngestCoordinator::new(store.clone(), queue).run(shutdown.subscribe()));

    let mut watchers = Vec::with_capacity(config.watch_dirs.len());
    for dir in &config.watch_dirs {
        let dir = dir.clone();
        let task = tokio::spawn(watcher::watch_directory(
            dir.clone(),
            notifier.clone(),
            shutdown.subscribe(),
            config.scan_existing,
        ));
        watchers.push((dir, task));
    }
    // Only watchers keep the queue open now.
    drop(notifier);

    info!("templogd ready");

    let stats = join_coordinator(coordinator).await;

    // The coordinator may stop first when every watcher failed.
    let _ = shutdown.send(());
    for (dir, task) in watchers {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Watcher for {} failed: {:#}", dir.display(), e),
            Err(e) => error!("Watcher for {} panicked: {}", dir.display(), e),
        }
    }

    store.close().await;
    info!(
        imported = stats.files_imported,
        failed = stats.files_failed,
        inserted = stats.readings_inserted,
        "templogd stopped"
    );
    Ok(())
}
