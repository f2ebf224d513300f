//! Configuration for the riskstream relay
//!
//! Provides:
//! - Optional TOML config file
//! - Environment variable overrides (`RISKSTREAM_*`)
//! - Startup validation
//!
//! CLI flags are merged on top by the binary; precedence is
//! flags > environment > file > defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay settings
    pub relay: RelaySettings,

    /// Vendor API authentication
    pub auth: AuthSettings,

    /// Event stream settings
    pub stream: StreamSettings,

    /// Metadata cache settings
    pub cache: CacheSettings,

    /// Sink settings
    pub export: ExportSettings,
}

/// Relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Vendor API authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Long-lived application key exchanged for short-lived access tokens.
    /// Required; startup is fatal without it.
    pub application_key: String,

    /// Vendor API base URL
    pub api_base: String,

    /// Seconds before expiry at which a token is considered stale
    pub safety_margin_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            application_key: String::new(),
            api_base: "https://api.lookout.com".to_string(),
            safety_margin_secs: 30,
        }
    }
}

impl AuthSettings {
    /// OAuth token endpoint
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.api_base.trim_end_matches('/'))
    }

    /// Get safety margin as Duration
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }
}

/// Event stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Event kinds the server is asked to emit (`types` query parameter)
    pub event_types: Vec<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Max consecutive connection failures before giving up
    pub max_retries: u32,

    /// Initial reconnect delay in milliseconds (doubles per attempt)
    pub backoff_base_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    pub backoff_max_ms: u64,

    /// Pipeline channel capacity
    pub buffer_size: usize,

    /// Shutdown drain grace period in milliseconds
    pub drain_grace_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            event_types: vec![
                "THREAT".to_string(),
                "DEVICE".to_string(),
                "AUDIT".to_string(),
            ],
            connect_timeout_ms: 10_000,
            max_retries: 10,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            buffer_size: 1_024,
            drain_grace_ms: 5_000,
        }
    }
}

impl StreamSettings {
    /// Streaming endpoint relative to the API base
    pub fn stream_url(&self, api_base: &str) -> String {
        format!("{}/mra/stream/v2/events", api_base.trim_end_matches('/'))
    }

    /// Comma-separated `types` filter value, empty when no filter applies
    pub fn types_param(&self) -> Option<String> {
        if self.event_types.is_empty() {
            None
        } else {
            Some(self.event_types.join(","))
        }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get initial backoff delay as Duration
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get backoff ceiling as Duration
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get drain grace period as Duration
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

/// Metadata cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Enable cache-backed enrichment
    pub enabled: bool,

    /// Cache host
    pub host: String,

    /// Cache port
    pub port: u16,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 6379,
        }
    }
}

impl CacheSettings {
    /// Redis-protocol connection URL
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Sink settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Human-readable console output
    pub console: ConsoleSettings,

    /// Durable JSONL log
    pub jsonl: JsonlSettings,

    /// Object-store upload
    pub object_store: ObjectStoreSettings,
}

/// Console sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub enabled: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// JSONL sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlSettings {
    pub enabled: bool,

    /// Output file path
    pub path: PathBuf,
}

impl Default for JsonlSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("riskstream-events.jsonl"),
        }
    }
}

/// Object-store sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreSettings {
    pub enabled: bool,

    /// Endpoint base URL; derived from the region when unset
    pub endpoint: Option<String>,

    /// Bucket name; required when the sink is enabled
    pub bucket: Option<String>,

    /// Storage region
    pub region: String,

    /// Optional bearer token for the storage gateway
    pub bearer_token: Option<String>,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Max upload retries
    pub max_retries: u32,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            bucket: None,
            region: "us-east-1".to_string(),
            bearer_token: None,
            timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl ObjectStoreSettings {
    /// Endpoint the sink uploads to
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RelayConfig {
    /// Load configuration from an optional file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                let config: RelayConfig = toml::from_str(&content)?;
                debug!("Loaded config from {:?}", p);
                config
            }
            None => RelayConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `RISKSTREAM_*` environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("RISKSTREAM_APPLICATION_KEY") {
            self.auth.application_key = val;
        }
        if let Ok(val) = std::env::var("RISKSTREAM_API_BASE") {
            self.auth.api_base = val;
        }
        if let Ok(val) = std::env::var("RISKSTREAM_EVENT_TYPES") {
            self.stream.event_types = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var("RISKSTREAM_CACHE_HOST") {
            self.cache.host = val;
        }
        if let Ok(val) = std::env::var("RISKSTREAM_CACHE_PORT") {
            if let Ok(port) = val.parse() {
                self.cache.port = port;
            }
        }
        if let Ok(val) = std::env::var("RISKSTREAM_S3_ENDPOINT") {
            self.export.object_store.endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("RISKSTREAM_S3_BUCKET") {
            self.export.object_store.enabled = true;
            self.export.object_store.bucket = Some(val);
        }
        if let Ok(val) = std::env::var("RISKSTREAM_S3_REGION") {
            self.export.object_store.region = val;
        }
    }

    /// Validate the configuration; called once at startup.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.auth.application_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "application key is missing (set RISKSTREAM_APPLICATION_KEY)".to_string(),
            ));
        }
        if self.export.object_store.enabled && self.export.object_store.bucket.is_none() {
            return Err(ConfigError::ValidationError(
                "object-store sink is enabled but no bucket is configured".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.auth.api_base, "https://api.lookout.com");
        assert_eq!(config.stream.event_types, vec!["THREAT", "DEVICE", "AUDIT"]);
        assert_eq!(config.cache.port, 6379);
        assert!(config.export.console.enabled);
        assert!(!config.export.object_store.enabled);
    }

    #[test]
    fn test_urls() {
        let config = RelayConfig::default();
        assert_eq!(
            config.auth.token_url(),
            "https://api.lookout.com/oauth2/token"
        );
        assert_eq!(
            config.stream.stream_url(&config.auth.api_base),
            "https://api.lookout.com/mra/stream/v2/events"
        );
        assert_eq!(config.cache.url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_duration_helpers() {
        let config = RelayConfig::default();
        assert_eq!(config.auth.safety_margin(), Duration::from_secs(30));
        assert_eq!(config.stream.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.stream.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.stream.drain_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [auth]
            application_key = "app-key-1"

            [stream]
            event_types = ["THREAT"]

            [export.object_store]
            enabled = true
            bucket = "telemetry"
            region = "eu-west-1"
        "#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.auth.application_key, "app-key-1");
        assert_eq!(config.stream.types_param().as_deref(), Some("THREAT"));
        assert_eq!(
            config.export.object_store.endpoint_url(),
            "https://s3.eu-west-1.amazonaws.com"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_application_key() {
        let config = RelayConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_requires_bucket_when_enabled() {
        let mut config = RelayConfig::default();
        config.auth.application_key = "k".to_string();
        config.export.object_store.enabled = true;
        assert!(config.validate().is_err());

        config.export.object_store.bucket = Some("telemetry".to_string());
        assert!(config.validate().is_ok());
    }
}
