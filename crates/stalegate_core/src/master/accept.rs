use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::{coordinator::Coordinator, worker::handle_connection};

/// Pause after a failed `accept()` before trying again.
pub(crate) const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of inbound connections. Implemented by `TcpListener`; tests script
/// their own.
pub(crate) trait Acceptor: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

pub(crate) async fn bind_listener(listen_addr: &str) -> anyhow::Result<TcpListener> {
    match TcpListener::bind(listen_addr).await {
        Ok(listener) => {
            info!(target: "stalegate::master", listen = %listen_addr, "Listener bound");
            Ok(listener)
        }
        Err(e) => {
            error!(
                target: "stalegate::master",
                listen = %listen_addr,
                error = ?e,
                "Cannot bind listen address"
            );
            Err(e.into())
        }
    }
}

/// Hand every accepted connection to a tracked worker task.
///
/// A connection slot is reserved before `accept()`, so at most
/// `max_connections` sockets are open at once. Accept failures (fd
/// exhaustion, aborted handshakes) are logged and retried after
/// [`ACCEPT_BACKOFF`]. Only a closed semaphore ends the loop.
#[instrument(
    skip(acceptor, semaphore, coordinator, connections, shutdown),
    fields(listen = %listen_addr)
)]
pub(crate) async fn accept_loop<A: Acceptor>(
    acceptor: A,
    listen_addr: String,
    semaphore: Arc<Semaphore>,
    coordinator: Arc<Coordinator>,
    connections: TaskTracker,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    debug!(target: "stalegate::master", "Accepting connections");

    loop {
        let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
            error!(target: "stalegate::master", error = ?e, "Connection semaphore closed");
            e
        })?;

        let (stream, client_addr) = match acceptor.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    target: "stalegate::master",
                    error = ?e,
                    backoff_ms = ACCEPT_BACKOFF.as_millis() as u64,
                    "accept() failed; retrying"
                );
                drop(permit);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        debug!(
            target: "stalegate::master",
            client_addr = %client_addr,
            free_slots = semaphore.available_permits(),
            "Connection accepted"
        );

        let coordinator = coordinator.clone();
        let shutdown = shutdown.clone();
        let span = tracing::info_span!("connection", client_addr = %client_addr);

        connections.spawn(
            async move {
                let _permit = permit;
                match handle_connection(stream, client_addr, coordinator, shutdown).await {
                    Ok(()) => debug!(target: "stalegate::worker", "Connection closed"),
                    Err(e) => warn!(
                        target: "stalegate::worker",
                        error = ?e,
                        "Connection ended with an error"
                    ),
                }
            }
            .instrument(span),
        );
    }
}
