//! Interrupt handling
//!
//! Turns Ctrl-C into a stop message for the pipeline.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Waits for Ctrl-C, then sends one stop message on `stop_tx`.
///
/// If the signal handler cannot be installed the sender is kept alive so
/// the pipeline keeps running rather than seeing a closed channel.
pub fn spawn_interrupt_listener(stop_tx: mpsc::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                let _ = stop_tx.send(()).await;
            }
            Err(e) => {
                tracing::error!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
                drop(stop_tx);
            }
        }
    })
}
