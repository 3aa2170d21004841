use std::borrow::Cow;

use bytes::Bytes;
use regex::bytes::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid rewrite pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Regex substitution applied to every body fetched from the origin.
///
/// Typical use is swapping the origin's own base URL for the public one in
/// HTML/JSON payloads. Works on raw bytes, so non-UTF-8 bodies pass through.
#[derive(Debug, Clone, Default)]
pub struct ContentRewriter {
    rule: Option<RewriteRule>,
}

#[derive(Debug, Clone)]
struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl ContentRewriter {
    /// Compile the rewrite rule. `None` or an empty pattern gives a rewriter
    /// that returns bodies untouched.
    pub fn new(pattern: Option<&str>, replacement: &str) -> Result<Self, RewriteError> {
        let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
            return Ok(Self::disabled());
        };

        let compiled = Regex::new(pattern).map_err(|source| RewriteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            rule: Some(RewriteRule {
                pattern: compiled,
                replacement: replacement.to_string(),
            }),
        })
    }

    pub fn disabled() -> Self {
        Self { rule: None }
    }

    /// Replace every non-overlapping match. `$1` / `${name}` in the
    /// replacement expand to capture groups. When nothing matches the input
    /// buffer is handed back without copying.
    pub fn apply(&self, body: Bytes) -> Bytes {
        let Some(rule) = &self.rule else {
            return body;
        };

        let rewritten = match rule.pattern.replace_all(&body, rule.replacement.as_bytes()) {
            Cow::Borrowed(_) => None,
            Cow::Owned(out) => Some(out),
        };

        rewritten.map(Bytes::from).unwrap_or(body)
    }
}
