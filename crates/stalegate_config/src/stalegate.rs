use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use tracing::info;

use crate::scope::CacheKeyScope;
use crate::validation::{validate, ConfigReport};

/// Config file read when `STALEGATE_CONFIG` is not set. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "stalegate.toml";

/// Env var that overrides the config file path.
pub const CONFIG_FILE_ENV: &str = "STALEGATE_CONFIG";

// =======================================================
// STALEGATE CONFIG (main config)
// =======================================================
//
// Keys are flat so they line up 1:1 with the env vars the proxy has always
// used (PROXY_BASE_URL, REWRITE_FROM, REWRITE_TO, PORT).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StalegateConfig {
    /// Origin base URL, e.g. `http://origin.internal:9000`.
    pub proxy_base_url: String,
    /// Regex applied to every fetched body. Unset or empty disables rewriting.
    pub rewrite_from: Option<String>,
    /// Replacement template (`$1`, `${name}` expand capture groups).
    pub rewrite_to: String,

    pub port: u16,
    pub listen_host: String,

    pub cache_key_scope: CacheKeyScope,
    /// Collapse concurrent fetches for the same key into one origin call.
    pub coalesce_misses: bool,
    /// 0 means wait for the origin forever.
    pub origin_timeout_secs: u64,

    pub max_connections: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for StalegateConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: String::new(),
            rewrite_from: None,
            rewrite_to: String::new(),
            port: 8080,
            listen_host: "0.0.0.0".into(),
            cache_key_scope: CacheKeyScope::default(),
            coalesce_misses: false,
            origin_timeout_secs: 0,
            max_connections: 1024,
            shutdown_grace_secs: 10,
        }
    }
}

impl StalegateConfig {
    pub fn proxy_base_url(&self) -> &str {
        &self.proxy_base_url
    }

    /// The rewrite pattern, if rewriting is enabled.
    pub fn rewrite_pattern(&self) -> Option<&str> {
        self.rewrite_from.as_deref().filter(|p| !p.is_empty())
    }

    pub fn rewrite_replacement(&self) -> &str {
        &self.rewrite_to
    }

    /// `host:port` string handed to `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }

    pub fn cache_key_scope(&self) -> CacheKeyScope {
        self.cache_key_scope
    }

    pub fn coalesce_misses(&self) -> bool {
        self.coalesce_misses
    }

    pub fn origin_timeout(&self) -> Option<Duration> {
        match self.origin_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    /// Load from the config file named by `STALEGATE_CONFIG` (or
    /// `stalegate.toml`), then overlay the process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let file_name =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file_name, None)
    }

    /// Same as [`load`](Self::load) with an explicit file and, optionally, an
    /// explicit set of variables standing in for the process environment.
    pub fn load_from(
        file_name: &str,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Toml).required(false))
            .add_source(config::Environment::default().source(env))
            .build()?;

        let mut cfg: StalegateConfig = built.try_deserialize()?;

        cfg.apply_defaults();
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        let defaults = StalegateConfig::default();

        self.proxy_base_url = self.proxy_base_url.trim().to_string();
        if self.listen_host.trim().is_empty() {
            self.listen_host = defaults.listen_host;
        }
        if self.max_connections == 0 {
            self.max_connections = defaults.max_connections;
        }
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        info!(
            target: "stalegate::config",
            origin = %self.proxy_base_url,
            listen = %self.listen_addr(),
            "Origin and listener"
        );
        info!(
            target: "stalegate::config",
            rewrite_from = self.rewrite_pattern().unwrap_or("-"),
            rewrite_to = %self.rewrite_to,
            "Body rewriting"
        );
        info!(
            target: "stalegate::config",
            cache_key_scope = %self.cache_key_scope,
            coalesce_misses = self.coalesce_misses,
            origin_timeout_secs = self.origin_timeout_secs,
            "Cache behaviour"
        );
        info!(
            target: "stalegate::config",
            max_connections = self.max_connections,
            shutdown_grace_secs = self.shutdown_grace_secs,
            "Limits"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::StalegateConfig;
    use crate::CacheKeyScope;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn load_from_reads_classic_env_vars() {
        let vars = env(&[
            ("PROXY_BASE_URL", "http://origin.test"),
            ("REWRITE_FROM", "origin\\.test"),
            ("REWRITE_TO", "public.test"),
            ("PORT", "9090"),
        ]);
        let cfg = StalegateConfig::load_from("does-not-exist.toml", Some(vars)).expect("config");

        assert_eq!(cfg.proxy_base_url(), "http://origin.test");
        assert_eq!(cfg.rewrite_pattern(), Some("origin\\.test"));
        assert_eq!(cfg.rewrite_replacement(), "public.test");
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn load_from_applies_defaults_when_env_is_sparse() {
        let vars = env(&[("PROXY_BASE_URL", "http://origin.test")]);
        let cfg = StalegateConfig::load_from("does-not-exist.toml", Some(vars)).expect("config");

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.cache_key_scope(), CacheKeyScope::MethodPathQuery);
        assert!(!cfg.coalesce_misses());
        assert_eq!(cfg.origin_timeout(), None);
        assert_eq!(cfg.rewrite_pattern(), None);
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(10));
    }

    #[test]
    fn load_from_parses_optional_knobs() {
        let vars = env(&[
            ("PROXY_BASE_URL", "http://origin.test"),
            ("CACHE_KEY_SCOPE", "path"),
            ("COALESCE_MISSES", "true"),
            ("ORIGIN_TIMEOUT_SECS", "3"),
            ("MAX_CONNECTIONS", "0"),
        ]);
        let cfg = StalegateConfig::load_from("does-not-exist.toml", Some(vars)).expect("config");

        assert_eq!(cfg.cache_key_scope(), CacheKeyScope::Path);
        assert!(cfg.coalesce_misses());
        assert_eq!(cfg.origin_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(cfg.max_connections(), 1024);
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> String {
        let path = dir.path().join("stalegate.toml");
        std::fs::write(&path, contents).expect("write config file");
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn load_from_reads_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write_config(
            &dir,
            "proxy_base_url = \"http://file.test\"\nport = 7000\ncache_key_scope = \"path\"\n",
        );
        let cfg = StalegateConfig::load_from(&file, Some(HashMap::new())).expect("config");

        assert_eq!(cfg.proxy_base_url(), "http://file.test");
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.cache_key_scope(), CacheKeyScope::Path);
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(10));
    }

    #[test]
    fn env_overrides_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write_config(
            &dir,
            "proxy_base_url = \"http://file.test\"\nport = 7000\n",
        );
        let vars = env(&[("PORT", "9000")]);
        let cfg = StalegateConfig::load_from(&file, Some(vars)).expect("config");

        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.proxy_base_url(), "http://file.test");
    }

    #[test]
    fn empty_rewrite_pattern_disables_rewriting() {
        let cfg = StalegateConfig {
            rewrite_from: Some(String::new()),
            ..StalegateConfig::default()
        };
        assert_eq!(cfg.rewrite_pattern(), None);
    }
}
