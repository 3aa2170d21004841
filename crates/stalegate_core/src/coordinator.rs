//! Per-request cache coordination.
//!
//! A hit is answered straight from the store while a detached task refreshes
//! the entry. A miss waits for the origin. Either way the fetch task writes the
//! store itself, so a client that disconnects mid-wait never loses the update.

mod inflight;

use std::sync::Arc;

use stalegate_cache::{CacheEntry, CacheKey, MemoryCacheStore};
use stalegate_config::{CacheKeyScope, StalegateConfig};
use stalegate_http::{
    responses::{internal_error, relay_entry},
    ProxyResponse,
};
use stalegate_proxy::{FetchError, OriginFetcher, OriginRequest, RewriteError};
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use inflight::{Flight, FetchOutcome, InflightFetches};

pub struct Coordinator {
    store: Arc<MemoryCacheStore>,
    fetcher: Arc<OriginFetcher>,
    scope: CacheKeyScope,
    inflight: Option<Arc<InflightFetches>>,
    tasks: TaskTracker,
}

impl Coordinator {
    pub fn new(fetcher: OriginFetcher, scope: CacheKeyScope, coalesce_misses: bool) -> Self {
        Self {
            store: Arc::new(MemoryCacheStore::new()),
            fetcher: Arc::new(fetcher),
            scope,
            inflight: coalesce_misses.then(|| Arc::new(InflightFetches::default())),
            tasks: TaskTracker::new(),
        }
    }

    pub fn from_config(cfg: &StalegateConfig) -> Result<Self, RewriteError> {
        let fetcher = OriginFetcher::from_config(cfg)?;
        Ok(Self::new(
            fetcher,
            cfg.cache_key_scope(),
            cfg.coalesce_misses(),
        ))
    }

    pub fn store(&self) -> &MemoryCacheStore {
        &self.store
    }

    /// Tracker for detached fetch tasks. Closed and awaited on shutdown.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// `None` for requests that must never be cached.
    pub fn key_for(&self, req: &OriginRequest) -> Option<CacheKey> {
        CacheKey::derive(self.scope, &req.method, &req.path, req.query.as_deref())
    }

    /// Answer one request.
    ///
    /// Never fails: origin trouble on a miss becomes an empty 500, on a hit it
    /// is only logged.
    pub async fn handle(&self, req: OriginRequest) -> ProxyResponse {
        let key = self.key_for(&req);

        if let Some(key) = &key {
            if let Some(entry) = self.store.get(key) {
                self.spawn_refresh(key.clone(), req);
                info!(
                    target: "stalegate::coordinator",
                    cache_key = %key,
                    age_ms = entry.age().as_millis() as u64,
                    "Served stale content from cache"
                );
                return relay_entry(&entry);
            }
            debug!(target: "stalegate::coordinator", cache_key = %key, "Cache miss");
        }

        match self.await_fresh(key, req).await {
            Ok(entry) => relay_entry(&entry),
            Err(err) => {
                error!(
                    target: "stalegate::coordinator",
                    error = %err,
                    "Origin fetch failed"
                );
                internal_error()
            }
        }
    }

    /// Background refresh after a stale serve. The response is already on its
    /// way, so failures are only logged.
    fn spawn_refresh(&self, key: CacheKey, req: OriginRequest) {
        let fetcher = self.fetcher.clone();
        let store = self.store.clone();

        match &self.inflight {
            Some(inflight) => {
                let Flight::Leader(tx) = inflight.join(&key) else {
                    debug!(target: "stalegate::coordinator", cache_key = %key, "Refresh already running");
                    return;
                };
                let inflight = inflight.clone();
                self.tasks.spawn(async move {
                    let outcome = run_fetch(&fetcher, &store, Some(&key), &req)
                        .await
                        .map_err(Arc::new);
                    log_refresh(&key, &outcome);
                    inflight.complete(&key, tx, outcome);
                });
            }
            None => {
                self.tasks.spawn(async move {
                    let outcome = run_fetch(&fetcher, &store, Some(&key), &req)
                        .await
                        .map_err(Arc::new);
                    log_refresh(&key, &outcome);
                });
            }
        }
    }

    /// Fetch on a detached task and wait for it. The task outlives this future
    /// if the client goes away.
    async fn await_fresh(
        &self,
        key: Option<CacheKey>,
        req: OriginRequest,
    ) -> Result<Arc<CacheEntry>, Arc<FetchError>> {
        let fetcher = self.fetcher.clone();
        let store = self.store.clone();

        if let (Some(inflight), Some(key)) = (&self.inflight, &key) {
            return match inflight.join(key) {
                Flight::Follower(rx) => {
                    debug!(target: "stalegate::coordinator", cache_key = %key, "Joining in-flight fetch");
                    inflight::wait(rx).await
                }
                Flight::Leader(tx) => {
                    let rx = tx.subscribe();
                    let inflight = inflight.clone();
                    let key = key.clone();
                    self.tasks.spawn(async move {
                        let outcome = run_fetch(&fetcher, &store, Some(&key), &req)
                            .await
                            .map_err(Arc::new);
                        inflight.complete(&key, tx, outcome);
                    });
                    inflight::wait(rx).await
                }
            };
        }

        let (done, result) = oneshot::channel();
        self.tasks.spawn(async move {
            let outcome = run_fetch(&fetcher, &store, key.as_ref(), &req).await;
            // Receiver gone means the client left; the store is already updated.
            let _ = done.send(outcome);
        });

        match result.await {
            Ok(outcome) => outcome.map_err(Arc::new),
            Err(_) => Err(Arc::new(FetchError::Abandoned)),
        }
    }
}

/// Fetch from the origin and, for cacheable requests, replace the stored entry.
async fn run_fetch(
    fetcher: &OriginFetcher,
    store: &MemoryCacheStore,
    key: Option<&CacheKey>,
    req: &OriginRequest,
) -> Result<Arc<CacheEntry>, FetchError> {
    let entry = Arc::new(fetcher.fetch(req).await?);
    if let Some(key) = key {
        store.put(key.clone(), entry.clone());
        debug!(
            target: "stalegate::coordinator",
            cache_key = %key,
            status = %entry.status,
            "Cache updated"
        );
    }
    Ok(entry)
}

fn log_refresh(key: &CacheKey, outcome: &FetchOutcome) {
    if let Err(err) = outcome {
        warn!(
            target: "stalegate::coordinator",
            cache_key = %key,
            error = %err,
            "Background refresh failed; keeping stale entry"
        );
    }
}
