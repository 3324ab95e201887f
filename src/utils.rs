//! Utility functions.

use tracing::info;

/// Resolve when the process receives a shutdown signal (ctrl-c).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install ctrl-c handler");
        return;
    }
    info!("Shutdown signal received");
}
