use crate::error::{ConfigError, ProxyError, Result};
use crate::rate_limit::types::{RateLimitConfig, DEFAULT_CAPACITY, DEFAULT_WINDOW_SECS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable that replaces `Store.Url`
pub const STORE_URL_ENV: &str = "TINYRP_STORE_URL";
/// Environment variable that replaces `Store.Password`
pub const STORE_PASSWORD_ENV: &str = "TINYRP_STORE_PASSWORD";

/// Main proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyConfig {
    /// Address the proxy listens on
    #[serde(default)]
    pub domain_name: String,
    /// Port the proxy listens on
    #[serde(default)]
    pub port: i64,
    /// Backend resources, matched by endpoint prefix
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Backend request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,
    /// Optional port for the Prometheus metrics listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<i64>,
    /// Rate limiting policy
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Shared store connection
    #[serde(default)]
    pub store: StoreConfig,
}

/// A single backend resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceConfig {
    /// Backend host
    #[serde(default)]
    pub domain_name: String,
    /// Backend port
    #[serde(default)]
    pub port: i64,
    /// Path prefix routed to this backend
    #[serde(default)]
    pub endpoint: String,
}

/// Rate limiting section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RateLimitSettings {
    /// Requests allowed per client per window
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Window length in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,
    /// Prefix prepended to every counter key in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Shared store implementation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Redis,
    Memory,
}

/// Shared store section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Store URL (`redis://` or `rediss://`)
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Password or secret reference (`env://VAR`, `file:///path`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Logical database
    #[serde(default)]
    pub database: i64,
    /// Per-operation timeout in milliseconds
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_window() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_key_prefix() -> String {
    "tinyrp:ratelimit:".to_string()
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_store_timeout() -> u64 {
    500
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_secs: default_window(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RateLimitSettings {
    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            capacity: self.capacity,
            window_secs: self.window_secs,
            key_prefix: self.key_prefix.clone(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            url: default_store_url(),
            password: None,
            database: 0,
            timeout_ms: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ProxyConfig {
    /// Load configuration from a YAML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ProxyError::ConfigLoad(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::ConfigLoad(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without validating it
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ProxyError::ConfigLoad(format!("failed to parse YAML config: {}", e)))
    }

    /// Replace store connection parameters with values from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(STORE_URL_ENV) {
            debug!("Store URL overridden from {}", STORE_URL_ENV);
            self.store.url = url;
        }
        if let Ok(password) = env::var(STORE_PASSWORD_ENV) {
            debug!("Store password overridden from {}", STORE_PASSWORD_ENV);
            self.store.password = Some(password);
        }
    }

    /// Validate configuration, reporting the first offending field
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.domain_name.is_empty() {
            return Err(ConfigError::new("DomainName", "domain name is required"));
        }

        if !is_valid_port(self.port) {
            return Err(ConfigError::new("Port", "port must be between 1 and 65535"));
        }

        if self.resources.is_empty() {
            return Err(ConfigError::new(
                "Resources",
                "at least one resource is required",
            ));
        }

        for (index, resource) in self.resources.iter().enumerate() {
            resource.validate(index)?;
        }

        let mut endpoints = HashSet::new();
        for (index, resource) in self.resources.iter().enumerate() {
            if !endpoints.insert(resource.endpoint.as_str()) {
                return Err(ConfigError::new(
                    format!("Resources[{}].Endpoint", index),
                    format!("duplicate endpoint '{}'", resource.endpoint),
                ));
            }
        }

        if self.backend_timeout_secs == 0 {
            return Err(ConfigError::new(
                "BackendTimeoutSecs",
                "backend timeout must be > 0",
            ));
        }

        if let Some(port) = self.metrics_port {
            if !is_valid_port(port) {
                return Err(ConfigError::new(
                    "MetricsPort",
                    "port must be between 1 and 65535",
                ));
            }
            if port == self.port {
                return Err(ConfigError::new(
                    "MetricsPort",
                    "metrics port must differ from the proxy port",
                ));
            }
        }

        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::new("RateLimit.Capacity", "capacity must be > 0"));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::new("RateLimit.WindowSecs", "window must be > 0"));
        }

        if self.store.kind == StoreKind::Redis {
            if self.store.url.is_empty() {
                return Err(ConfigError::new("Store.Url", "store URL is required"));
            }
            if !self.store.url.starts_with("redis://") && !self.store.url.starts_with("rediss://")
            {
                return Err(ConfigError::new(
                    "Store.Url",
                    "store URL must start with redis:// or rediss://",
                ));
            }
            if self.store.database < 0 {
                return Err(ConfigError::new("Store.Database", "database must be >= 0"));
            }
        }

        if self.store.timeout_ms == 0 {
            return Err(ConfigError::new("Store.TimeoutMs", "store timeout must be > 0"));
        }

        Ok(())
    }

    /// Validate and write the configuration as YAML, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;

        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ProxyError::Internal(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Listen address as `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.domain_name, self.port)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// A valid configuration for local testing
    pub fn default_config() -> Self {
        Self {
            domain_name: "localhost".to_string(),
            port: 8080,
            resources: vec![ResourceConfig {
                domain_name: "localhost".to_string(),
                port: 9000,
                endpoint: "/".to_string(),
            }],
            backend_timeout_secs: default_backend_timeout(),
            metrics_port: None,
            rate_limit: RateLimitSettings::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ResourceConfig {
    fn validate(&self, index: usize) -> std::result::Result<(), ConfigError> {
        let field = |name: &str| format!("Resources[{}].{}", index, name);

        if self.domain_name.is_empty() {
            return Err(ConfigError::new(
                field("DomainName"),
                "domain name is required",
            ));
        }

        if self.endpoint.is_empty() {
            return Err(ConfigError::new(field("Endpoint"), "endpoint is required"));
        }

        if !is_valid_port(self.port) {
            return Err(ConfigError::new(
                field("Port"),
                "port must be between 1 and 65535",
            ));
        }

        if !self.endpoint.starts_with('/') {
            return Err(ConfigError::new(
                field("Endpoint"),
                "endpoint must start with '/'",
            ));
        }

        Ok(())
    }
}

fn is_valid_port(port: i64) -> bool {
    (1..=65535).contains(&port)
}
