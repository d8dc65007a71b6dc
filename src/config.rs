use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logs::{hub::DEFAULT_QUEUE_SIZE, query::DEFAULT_LIMIT, store::DEFAULT_CAPACITY};

/// Environment variable prefix, e.g. `OPSLOG__INGEST__API_KEY`
pub const ENV_PREFIX: &str = "OPSLOG";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogsConfig {
    /// Number of entries retained in memory
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Per-subscriber queue capacity for live streams
    #[serde(default = "default_stream_queue_size")]
    pub stream_queue_size: usize,

    /// Maximum idle time on a stream before a keep-alive is sent
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,

    /// Page size used when a query does not pass `limit`
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            stream_queue_size: default_stream_queue_size(),
            heartbeat_seconds: default_heartbeat_seconds(),
            default_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Shared secret for `POST /logs/ingest`; unset means the endpoint is open
    #[serde(default)]
    pub api_key: Option<String>,
}

impl IngestConfig {
    /// The configured key, treating an empty string as unset
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_CAPACITY
}

fn default_stream_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_heartbeat_seconds() -> u64 {
    15
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Load configuration from an optional TOML file, overlaid with `OPSLOG__*` environment variables
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.logs.buffer_size == 0 {
        anyhow::bail!("logs.buffer_size must be at least 1");
    }

    // One slot for the overflow marker and one for the entry that follows it
    if cfg.logs.stream_queue_size < 2 {
        anyhow::bail!("logs.stream_queue_size must be at least 2");
    }

    if cfg.logs.heartbeat_seconds == 0 {
        anyhow::bail!("logs.heartbeat_seconds must be at least 1");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("server.log_format must be 'text' or 'json', got '{}'", other),
    }

    Ok(())
}

/// Mask a secret for display, keeping a short prefix
pub fn mask_secret(secret: &str) -> String {
    let visible = 4;
    if secret.chars().count() <= visible * 2 {
        "***".to_string()
    } else {
        let prefix: String = secret.chars().take(visible).collect();
        format!("{}***", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logs.buffer_size, 50_000);
        assert_eq!(cfg.logs.stream_queue_size, 100);
        assert_eq!(cfg.logs.heartbeat_seconds, 15);
        assert_eq!(cfg.logs.default_limit, 100);
        assert!(cfg.ingest.key().is_none());
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = load_config(Path::new("/nonexistent/opslog.toml")).unwrap();
        assert_eq!(cfg.logs.buffer_size, 50_000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090
log_format = "json"

[logs]
buffer_size = 10
stream_queue_size = 5

[ingest]
api_key = "shared-secret"
"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.logs.buffer_size, 10);
        assert_eq!(cfg.logs.stream_queue_size, 5);
        assert_eq!(cfg.logs.heartbeat_seconds, 15);
        assert_eq!(cfg.ingest.key(), Some("shared-secret"));
    }

    #[test]
    fn test_empty_key_means_open() {
        let cfg = IngestConfig { api_key: Some(String::new()) };
        assert!(cfg.key().is_none());
    }

    #[test]
    fn test_validate_rejects_tiny_stream_queue() {
        let mut cfg = Config::default();
        cfg.logs.stream_queue_size = 1;
        let result = validate_config(&cfg);
        assert!(result.unwrap_err().to_string().contains("stream_queue_size"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut cfg = Config::default();
        cfg.server.log_format = "xml".to_string();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-live-0123456789"), "sk-l***");
    }
}
