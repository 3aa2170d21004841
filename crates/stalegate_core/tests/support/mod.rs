#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use stalegate_config::{CacheKeyScope, StalegateConfig};
use stalegate_core::{Coordinator, Master};
use stalegate_http::ProxyResponse;
use stalegate_proxy::OriginRequest;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What the stub origin saw for one request.
pub struct OriginCall {
    /// 1-based arrival order.
    pub hit: usize,
    pub method: Method,
    pub path_and_query: String,
    pub body: Bytes,
}

/// Stub upstream on an ephemeral port, counting every request it answers.
pub struct MockOrigin {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockOrigin {
    pub async fn start<F, Fut>(handler: F) -> Self
    where
        F: Fn(OriginCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, mut rx) = oneshot::channel();
        let handler = Arc::new(handler);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    res = listener.accept() => {
                        let (stream, _) = match res { Ok(v) => v, Err(_) => break };
                        let io = TokioIo::new(stream);
                        let handler = Arc::clone(&handler);
                        let counter = Arc::clone(&counter);
                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let handler = Arc::clone(&handler);
                                let counter = Arc::clone(&counter);
                                async move {
                                    let (parts, body) = req.into_parts();
                                    let body = body.collect().await?.to_bytes();
                                    let call = OriginCall {
                                        hit: counter.fetch_add(1, Ordering::SeqCst) + 1,
                                        method: parts.method,
                                        path_and_query: parts
                                            .uri
                                            .path_and_query()
                                            .map(|pq| pq.as_str().to_string())
                                            .unwrap_or_default(),
                                        body,
                                    };
                                    Ok::<_, hyper::Error>(handler(call).await)
                                }
                            });
                            let _ = hyper::server::conn::http1::Builder::new()
                                .serve_connection(io, service)
                                .await;
                        });
                    }
                }
            }
        });

        Self {
            addr,
            hits,
            shutdown: Some(shutdown),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockOrigin {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub fn reply(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .expect("response")
}

/// Base URL nothing listens on.
pub async fn closed_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn config(origin: &str) -> StalegateConfig {
    StalegateConfig {
        proxy_base_url: origin.to_string(),
        ..StalegateConfig::default()
    }
}

pub fn coordinator(origin: &str) -> Coordinator {
    Coordinator::from_config(&config(origin)).expect("coordinator")
}

pub fn coalescing_coordinator(origin: &str) -> Coordinator {
    let cfg = StalegateConfig {
        coalesce_misses: true,
        cache_key_scope: CacheKeyScope::MethodPathQuery,
        ..config(origin)
    };
    Coordinator::from_config(&cfg).expect("coordinator")
}

pub fn get(path_and_query: &str) -> OriginRequest {
    request(Method::GET, path_and_query, Bytes::new())
}

pub fn request(method: Method, path_and_query: &str, body: Bytes) -> OriginRequest {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };
    OriginRequest::new(method, path, query, body)
}

#[derive(Clone, Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub async fn collect(resp: ProxyResponse) -> TestResponse {
    let (parts, body) = resp.into_parts();
    let body = body.collect().await.expect("body").to_bytes();
    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// A running proxy on an ephemeral port.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub coordinator: Arc<Coordinator>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl RunningProxy {
    pub async fn start(cfg: StalegateConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind proxy");
        let addr = listener.local_addr().expect("proxy addr");
        let master = Master::new(cfg).expect("master");
        let coordinator = master.coordinator().clone();
        let (shutdown, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            master
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            coordinator,
            shutdown: Some(shutdown),
            task,
        }
    }

    pub async fn send(&self, method: Method, path_and_query: &str, body: &'static str) -> TestResponse {
        let stream = tokio::net::TcpStream::connect(self.addr)
            .await
            .expect("connect proxy");
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .expect("handshake");
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header(http::header::HOST, self.addr.to_string())
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .expect("request");

        let resp = sender.send_request(req).await.expect("send request");
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        (&mut self.task).await.expect("proxy task")
    }
}
