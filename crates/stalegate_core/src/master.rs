use std::{future::Future, sync::Arc};

use anyhow::Context;
use stalegate_config::StalegateConfig;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, instrument, warn};

use crate::coordinator::Coordinator;

mod accept;
mod signal;
mod startup;

use accept::{accept_loop, bind_listener};
use signal::shutdown_signal;

pub struct Master {
    cfg: Arc<StalegateConfig>,
    coordinator: Arc<Coordinator>,
}

impl Master {
    /// Build the coordinator from `cfg`. Fails on an invalid rewrite pattern.
    pub fn new(cfg: StalegateConfig) -> anyhow::Result<Self> {
        let coordinator =
            Coordinator::from_config(&cfg).context("failed to compile body rewrite rule")?;

        Ok(Self {
            cfg: Arc::new(cfg),
            coordinator: Arc::new(coordinator),
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM.
    #[instrument(skip(self), fields(listen = %self.cfg.listen_addr()))]
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = bind_listener(&self.cfg.listen_addr()).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// drain open connections and pending origin fetches.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        self.log_startup();

        let listen_addr = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.cfg.listen_addr());
        let semaphore = self.init_semaphore();
        let connections = TaskTracker::new();
        let stop = CancellationToken::new();

        info!(target: "stalegate::master", listen = %listen_addr, "Listening");

        let accept_result = tokio::select! {
            res = accept_loop(
                listener,
                listen_addr.clone(),
                semaphore,
                self.coordinator.clone(),
                connections.clone(),
                stop.clone(),
            ) => res,
            _ = shutdown => Ok(()),
        };

        if let Err(e) = &accept_result {
            error!(
                target: "stalegate::master",
                listen = %listen_addr,
                error = ?e,
                "accept_loop exited with an error"
            );
        }

        stop.cancel();
        self.drain(&connections).await;

        accept_result
    }

    async fn drain(&self, connections: &TaskTracker) {
        let fetches = self.coordinator.tasks();
        connections.close();
        fetches.close();

        info!(
            target: "stalegate::master",
            open_connections = connections.len(),
            pending_fetches = fetches.len(),
            "Draining before exit"
        );

        let grace = self.cfg.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            connections.wait().await;
            fetches.wait().await;
        })
        .await;

        match drained {
            Ok(()) => info!(target: "stalegate::master", "Shutdown complete"),
            Err(_) => warn!(
                target: "stalegate::master",
                grace_secs = grace.as_secs(),
                open_connections = connections.len(),
                pending_fetches = fetches.len(),
                "Grace period elapsed; abandoning remaining work"
            ),
        }
    }
}
