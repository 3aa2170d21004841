use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::Full;
use stalegate_cache::CacheEntry;

use crate::ProxyResponse;

/// Replay a cached entry: status, body and every header except
/// `Content-Length`, which hyper recomputes from the body.
///
/// `HeaderMap` iterates repeated names value by value in insertion order, and
/// `Builder::header` appends, so multi-valued headers keep their order.
pub fn relay_entry(entry: &CacheEntry) -> ProxyResponse {
    let mut builder = Response::builder().status(entry.status);
    for (name, value) in entry.headers.iter() {
        if *name == header::CONTENT_LENGTH {
            continue;
        }
        builder = builder.header(name, value);
    }

    builder
        .body(Full::new(entry.body.clone()))
        .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR))
}

/// A response with the given status and no body.
pub fn empty_response(status: StatusCode) -> ProxyResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Fetch failed and nothing was cached to fall back on.
pub fn internal_error() -> ProxyResponse {
    empty_response(StatusCode::INTERNAL_SERVER_ERROR)
}

/// The inbound request body could not be read.
pub fn bad_request() -> ProxyResponse {
    empty_response(StatusCode::BAD_REQUEST)
}
