use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// One origin response as it will be replayed to clients.
///
/// Entries are never mutated after construction; the store swaps whole
/// `Arc<CacheEntry>` values when a refresh lands.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub status: StatusCode,
    /// Every origin header, multi-valued ones in their original order.
    pub headers: HeaderMap,
    /// Body after content rewriting.
    pub body: Bytes,
    pub fetched_at: SystemTime,
}

impl CacheEntry {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            fetched_at: SystemTime::now(),
        }
    }

    /// Time since the origin produced this entry.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed().unwrap_or_default()
    }
}
