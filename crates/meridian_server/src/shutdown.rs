//! Graceful shutdown handling.
//!
//! Cross-platform signal handling for server shutdown: the binary waits on
//! the returned receiver and calls `GameServer::shutdown` when it fires.

use tokio::sync::oneshot;
use tracing::info;

/// Listens for termination signals and resolves the returned receiver when
/// one arrives.
///
/// Unix: SIGINT and SIGTERM. Windows: Ctrl+C.
pub async fn setup_shutdown_handler() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to create SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to create SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT received - initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received - initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows::ctrl_c;

            let mut ctrl_c = ctrl_c().expect("Failed to create Ctrl+C handler");
            ctrl_c.recv().await;
            info!("Ctrl+C received - initiating graceful shutdown");
        }

        let _ = tx.send(());
    });

    rx
}
