//! Shutdown signalling for templogd.
//!
//! One broadcast sender is shared by the process; every watcher and the
//! ingestion coordinator hold their own receiver, so a single signal wakes
//! all of them.

use tokio::sync::broadcast;
use tracing::{error, info};

/// Create the shutdown sender.
///
/// A message is broadcast when SIGINT or SIGTERM is received. Subscribe
/// every listener before the runtime starts waiting.
pub fn shutdown_signal() -> broadcast::Sender<()> {
    let (tx, _) = broadcast::channel(1);
    let signal_tx = tx.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                info!("Received SIGTERM");
            }
        }

        let _ = signal_tx.send(());
    });

    tx
}
