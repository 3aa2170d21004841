use std::fmt;

use serde::Deserialize;

/// Which parts of a request form its cache key.
///
/// Exactly one scope is active per process:
/// - `MethodPathQuery` keys on `METHOD#path#query` and only GET is cacheable.
/// - `Path` keys on the path alone, for every method but HEAD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyScope {
    #[default]
    MethodPathQuery,
    Path,
}

impl fmt::Display for CacheKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKeyScope::MethodPathQuery => write!(f, "method_path_query"),
            CacheKeyScope::Path => write!(f, "path"),
        }
    }
}
