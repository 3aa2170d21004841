use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use http_body_util::BodyExt;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use stalegate_http::{responses::bad_request, ProxyResponse};
use stalegate_proxy::OriginRequest;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::coordinator::Coordinator;

/// Serve one client connection (HTTP/1.1, keep-alive) until the peer closes
/// it or `shutdown` fires. On shutdown the request in progress is finished
/// before the connection is closed.
#[instrument(skip(stream, coordinator, shutdown), fields(client = %client_addr))]
pub async fn handle_connection<S>(
    stream: S,
    client_addr: SocketAddr,
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    debug!(target: "stalegate::worker", "Handling new client connection");

    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let coordinator = coordinator.clone();
        async move { handle_request(req, client_addr, coordinator).await }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => res.context("HTTP/1 connection error")?,
        _ = shutdown.cancelled() => {
            debug!(target: "stalegate::worker", "Shutdown requested; finishing connection");
            conn.as_mut().graceful_shutdown();
            conn.await.context("HTTP/1 connection error during shutdown")?;
        }
    }

    Ok(())
}

async fn handle_request(
    req: Request<Incoming>,
    client_addr: SocketAddr,
    coordinator: Arc<Coordinator>,
) -> Result<ProxyResponse, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(
                target: "stalegate::worker",
                client_addr = %client_addr,
                error = ?e,
                "Failed to read request body"
            );
            return Ok(bad_request());
        }
    };

    let origin_req = OriginRequest::from_parts(&parts, body);
    let resp = coordinator.handle(origin_req).await;

    info!(
        target: "stalegate::worker",
        client_addr = %client_addr,
        method = %parts.method,
        path = %parts.uri.path(),
        status = resp.status().as_u16(),
        "Request served"
    );

    Ok(resp)
}
