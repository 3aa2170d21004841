//! Per-key registry of origin fetches that are still running.
//!
//! Only used when miss coalescing is enabled. The first request for a key
//! becomes the leader and owns the `watch::Sender`; later requests subscribe to
//! the same channel and get the leader's outcome.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use stalegate_cache::{CacheEntry, CacheKey};
use stalegate_proxy::FetchError;
use tokio::sync::watch;

/// Result of one origin fetch, shareable between every waiter.
pub(crate) type FetchOutcome = Result<Arc<CacheEntry>, Arc<FetchError>>;

type Slot = Option<FetchOutcome>;

pub(crate) enum Flight {
    /// Caller must run the fetch and report through [`InflightFetches::complete`].
    Leader(watch::Sender<Slot>),
    /// A fetch is already running; wait on it.
    Follower(watch::Receiver<Slot>),
}

#[derive(Default)]
pub(crate) struct InflightFetches {
    pending: DashMap<CacheKey, watch::Receiver<Slot>>,
}

impl InflightFetches {
    /// Join the fetch for `key`, or register a new one.
    ///
    /// A registration whose sender is gone (leader task died before
    /// reporting) is replaced instead of joined.
    pub(crate) fn join(&self, key: &CacheKey) -> Flight {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().has_changed().is_ok() {
                    return Flight::Follower(occupied.get().clone());
                }
                let (tx, rx) = watch::channel(None);
                occupied.insert(rx);
                Flight::Leader(tx)
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx);
                Flight::Leader(tx)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, key: &CacheKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Publish the leader's outcome, then unregister the key. The cache write
    /// has already happened, so requests arriving after this see a hit.
    pub(crate) fn complete(&self, key: &CacheKey, tx: watch::Sender<Slot>, outcome: FetchOutcome) {
        tx.send_replace(Some(outcome));
        self.pending.remove(key);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Wait for a flight to land.
pub(crate) async fn wait(mut rx: watch::Receiver<Slot>) -> FetchOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(slot) => slot
            .clone()
            .unwrap_or_else(|| Err(Arc::new(FetchError::Abandoned))),
        Err(_) => Err(Arc::new(FetchError::Abandoned)),
    }
}
