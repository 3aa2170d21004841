pub mod responses;

/// Response type every handler in the workspace produces.
pub type ProxyResponse = http::Response<http_body_util::Full<bytes::Bytes>>;
