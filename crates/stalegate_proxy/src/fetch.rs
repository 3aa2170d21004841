use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use stalegate_cache::CacheEntry;
use stalegate_config::StalegateConfig;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::path::upstream_uri;
use crate::rewrite::{ContentRewriter, RewriteError};

type OriginClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Everything about an inbound request that is mirrored to the origin.
///
/// The body is collected up front so a background refresh can replay it
/// after the client connection is gone.
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string, without the `?`.
    pub query: Option<String>,
    pub body: Bytes,
}

impl OriginRequest {
    pub fn new(method: Method, path: impl Into<String>, query: Option<&str>, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            query: query.map(str::to_string),
            body,
        }
    }

    pub fn from_parts(parts: &http::request::Parts, body: Bytes) -> Self {
        Self::new(
            parts.method.clone(),
            parts.uri.path(),
            parts.uri.query(),
            body,
        )
    }
}

/// Why a fetch produced no entry. The coordinator treats every variant the
/// same way; the split exists for logs.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] http::Error),

    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read upstream body: {0}")]
    Body(#[from] hyper::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("fetch task ended without reporting a result")]
    Abandoned,
}

/// Issues requests to the origin and packages the answers as cache entries.
///
/// One pooled client is shared by every fetch.
pub struct OriginFetcher {
    base_url: String,
    client: OriginClient,
    rewriter: ContentRewriter,
    timeout: Option<Duration>,
}

impl OriginFetcher {
    pub fn new(base_url: impl Into<String>, rewriter: ContentRewriter) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_client(),
            rewriter,
            timeout: None,
        }
    }

    /// Bound each fetch. `None` waits for the origin indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the process config. Fails only on a bad rewrite pattern.
    pub fn from_config(cfg: &StalegateConfig) -> Result<Self, RewriteError> {
        let rewriter = ContentRewriter::new(cfg.rewrite_pattern(), cfg.rewrite_replacement())?;
        Ok(Self::new(cfg.proxy_base_url(), rewriter).with_timeout(cfg.origin_timeout()))
    }

    /// Mirror `req` to the origin and return the rewritten response.
    #[instrument(
        skip(self, req),
        fields(method = %req.method, path = %req.path)
    )]
    pub async fn fetch(&self, req: &OriginRequest) -> Result<CacheEntry, FetchError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_once(req))
                .await
                .map_err(|_| FetchError::Timeout(limit))?,
            None => self.fetch_once(req).await,
        }
    }

    async fn fetch_once(&self, req: &OriginRequest) -> Result<CacheEntry, FetchError> {
        let uri: Uri = upstream_uri(&self.base_url, &req.path, req.query.as_deref()).parse()?;

        debug!(target: "stalegate::fetch", %uri, "Forwarding request to origin");

        let upstream_req = Request::builder()
            .method(req.method.clone())
            .uri(uri)
            .body(Full::new(req.body.clone()))?;

        let resp = self.client.request(upstream_req).await?;
        let (parts, body) = resp.into_parts();
        let body = body.collect().await?.to_bytes();
        let body = self.rewriter.apply(body);

        debug!(
            target: "stalegate::fetch",
            status = %parts.status,
            body_bytes = body.len(),
            "Origin responded"
        );

        Ok(CacheEntry::new(parts.status, parts.headers, body))
    }
}

fn build_client() -> OriginClient {
    let mut http = HttpConnector::new();
    http.set_nodelay(true);
    http.enforce_http(false);

    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new()).build(https)
}
