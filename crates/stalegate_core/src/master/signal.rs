use tracing::{error, info};

/// Resolves on SIGINT or SIGTERM. A signal that cannot be registered is
/// logged and never fires.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(target: "stalegate::master", error = ?e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(target: "stalegate::master", error = ?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!(target: "stalegate::master", signal = "SIGINT", "Shutdown signal received"),
        _ = terminate => info!(target: "stalegate::master", signal = "SIGTERM", "Shutdown signal received"),
    }
}
