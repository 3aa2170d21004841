//! Origin side of the proxy: fetching from the upstream and rewriting bodies.

pub mod fetch;
mod path;
pub mod rewrite;

pub use fetch::{FetchError, OriginFetcher, OriginRequest};
pub use rewrite::{ContentRewriter, RewriteError};
