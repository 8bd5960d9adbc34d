//! Change-event ingestion.
//!
//! Watchers push changed file paths into a bounded queue through a
//! [`ChangeNotifier`]. A single [`IngestCoordinator`] drains the queue and is
//! the only task that writes to the store. A full queue blocks producers;
//! nothing is dropped.

use crate::error::{Result, TemplogError};
use crate::import::import_file;
use crate::store::SensorStore;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Default capacity of the change queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Create a change queue with room for `capacity` pending paths.
pub fn change_queue(capacity: usize) -> (ChangeNotifier, mpsc::Receiver<PathBuf>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChangeNotifier { tx }, rx)
}

/// Producer side of the change queue. Clone one per watcher.
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    tx: mpsc::Sender<PathBuf>,
}

impl ChangeNotifier {
    /// Report that `path` was created or finished changing.
    ///
    /// Waits while the queue is full.
    pub async fn notify_changed(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.tx.send(path.into()).await.map_err(|_| queue_closed())
    }

    /// Blocking variant for callbacks running outside the async runtime.
    ///
    /// Must not be called from within an async task.
    pub fn blocking_notify_changed(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.tx.blocking_send(path.into()).map_err(|_| queue_closed())
    }

    /// Whether the coordinator has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn queue_closed() -> TemplogError {
    TemplogError::Internal("ingestion queue is closed".to_string())
}

/// Totals reported when the coordinator stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_imported: u64,
    pub files_failed: u64,
    pub readings_inserted: u64,
}

/// The single writer: imports every queued path into the store.
pub struct IngestCoordinator {
    store: SensorStore,
    queue: mpsc::Receiver<PathBuf>,
    stats: IngestStats,
}

impl IngestCoordinator {
    pub fn new(store: SensorStore, queue: mpsc::Receiver<PathBuf>) -> Self {
        Self { store, queue, stats: IngestStats::default() }
    }

    /// Drain the queue until shutdown is signalled or every producer is gone.
    ///
    /// Import errors are logged; they never stop the loop.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> IngestStats {
        info!("Ingestion coordinator started");

        loop {
            tokio::select! {
                biased;

                // A sent signal, a lagged receiver and a dropped sender all mean stop.
                _ = shutdown.recv() => {
                    info!("Ingestion coordinator received shutdown signal");
                    break;
                }
                path = self.queue.recv() => match path {
                    Some(path) => self.handle(path).await,
                    None => {
                        info!("All change producers closed");
                        break;
                    }
                },
            }
        }

        info!(
            imported = self.stats.files_imported,
            failed = self.stats.files_failed,
            inserted = self.stats.readings_inserted,
            "Ingestion coordinator stopped"
        );
        self.stats
    }

    async fn handle(&mut self, path: PathBuf) {
        info!("File {} has been modified", path.display());

        match import_file(&self.store, &path).await {
            Ok(report) => {
                self.stats.files_imported += 1;
                self.stats.readings_inserted += report.inserted as u64;
                metrics::counter!("templog_files_imported_total").increment(1);
            }
            Err(e) => {
                self.stats.files_failed += 1;
                metrics::counter!("templog_import_failures_total").increment(1);
                error!("Error loading log {}: {}", path.display(), e);
            }
        }

        self.report_counts().await;
    }

    async fn report_counts(&self) {
        for table in self.store.tables().await {
            match self.store.count(&table.name).await {
                Ok(rows) => {
                    metrics::gauge!("templog_table_rows", "sensor" => table.name.clone())
                        .set(rows as f64);
                    info!(sensor = %table.name, rows, "Table row count");
                }
                Err(e) => warn!(sensor = %table.name, "Failed to count rows: {}", e),
            }
        }
    }
}
