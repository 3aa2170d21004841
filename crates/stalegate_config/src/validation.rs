use std::net::SocketAddr;

use http::Uri;
use regex::bytes::Regex;

use crate::{CacheKeyScope, StalegateConfig};

/// Validation output for a loaded configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render warnings and errors into a readable, multi-line string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for (title, items) in [("Errors", &self.errors), ("Warnings", &self.warnings)] {
            if items.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(title);
            out.push_str(":\n");
            for item in items {
                out.push_str("  - ");
                out.push_str(item);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a configuration and return a report of issues.
pub fn validate(cfg: &StalegateConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_origin(cfg, &mut report);
    validate_rewrite(cfg, &mut report);
    validate_listener(cfg, &mut report);
    validate_cache(cfg, &mut report);

    report
}

fn validate_origin(cfg: &StalegateConfig, report: &mut ConfigReport) {
    let base = cfg.proxy_base_url.as_str();
    if base.is_empty() {
        report.error("proxy_base_url (PROXY_BASE_URL) is required");
        return;
    }

    let uri = match base.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            report.error(format!("proxy_base_url '{base}' is not a valid URL: {e}"));
            return;
        }
    };

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => report.error(format!(
            "proxy_base_url '{base}' uses unsupported scheme '{other}'"
        )),
        None => report.error(format!(
            "proxy_base_url '{base}' must start with http:// or https://"
        )),
    }

    if uri.host().is_none() {
        report.error(format!("proxy_base_url '{base}' has no host"));
    }

    if uri.query().is_some() {
        report.error(format!(
            "proxy_base_url '{base}' must not carry a query string"
        ));
    }

    if base.ends_with('/') {
        report.warn(format!(
            "proxy_base_url '{base}' ends with '/'; upstream paths will contain '//'"
        ));
    }
}

fn validate_rewrite(cfg: &StalegateConfig, report: &mut ConfigReport) {
    match cfg.rewrite_pattern() {
        Some(pattern) => {
            if let Err(e) = Regex::new(pattern) {
                report.error(format!("rewrite_from '{pattern}' is not a valid regex: {e}"));
            }
        }
        None => {
            if !cfg.rewrite_to.is_empty() {
                report.warn("rewrite_to is set but rewrite_from is empty; bodies are not rewritten");
            }
        }
    }
}

fn validate_listener(cfg: &StalegateConfig, report: &mut ConfigReport) {
    if cfg.port == 0 {
        report.error("port (PORT) must be between 1 and 65535");
        return;
    }

    let listen = cfg.listen_addr();
    if listen.parse::<SocketAddr>().is_err() {
        report.warn(format!(
            "listen address '{listen}' is not a socket address; DNS resolution will be used"
        ));
    }
}

fn validate_cache(cfg: &StalegateConfig, report: &mut ConfigReport) {
    if cfg.coalesce_misses && cfg.cache_key_scope == CacheKeyScope::Path {
        report.warn(
            "coalesce_misses with cache_key_scope = path lets requests with different methods share one origin fetch",
        );
    }
}
