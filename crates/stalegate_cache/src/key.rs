use std::fmt;

use http::Method;
use stalegate_config::CacheKeyScope;

use crate::policy::CachePolicy;

#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request, or `None` when the request must bypass
    /// the cache.
    ///
    /// An absent query and an empty one (`/p?`) produce the same key.
    pub fn derive(
        scope: CacheKeyScope,
        method: &Method,
        path: &str,
        query: Option<&str>,
    ) -> Option<Self> {
        match scope {
            CacheKeyScope::MethodPathQuery => {
                if !CachePolicy::is_cacheable(method) {
                    return None;
                }
                let query = query.unwrap_or("");
                Some(Self(format!("{method}#{path}#{query}")))
            }
            CacheKeyScope::Path => CachePolicy::is_path_shareable(method)
                .then(|| Self(path.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
