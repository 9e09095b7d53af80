//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tsdb::{DataSourceInfo, DEFAULT_RESOLUTION};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Data sources the query endpoint can address by name
    #[serde(default)]
    pub datasources: Vec<DataSourceInfo>,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Target bucket count for interval quantization
    #[serde(default = "default_resolution")]
    pub default_resolution: u32,

    /// Per-query backend deadline; unset means no deadline
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_resolution: default_resolution(),
            query_timeout_secs: None,
        }
    }
}

impl QueryConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }
}

/// Outbound HTTP client settings, shared by every backend
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("tsquery/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Build the client handed to every executor factory
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate().map_err(|error| ConfigError::Invalid {
            path: path.to_path_buf(),
            error,
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tsquery").join("config.toml")),
            Some(PathBuf::from("/etc/tsquery/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Look up a configured data source by name
    pub fn datasource(&self, name: &str) -> Option<&DataSourceInfo> {
        self.datasources.iter().find(|ds| ds.name == name)
    }

    /// Data source names must be unique
    fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for ds in &self.datasources {
            if !seen.insert(ds.name.as_str()) {
                return Err(format!("duplicate data source name '{}'", ds.name));
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(host) = lookup("TSQUERY_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("TSQUERY_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Transport overrides
        if let Some(secs) = lookup("TSQUERY_HTTP_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.http.timeout_secs = s;
            }
        }
        if let Some(secs) = lookup("TSQUERY_QUERY_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.query.query_timeout_secs = Some(s);
            }
        }

        // Logging overrides
        if let Some(level) = lookup("TSQUERY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TSQUERY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config file {path:?}: {error}")]
    Invalid { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# tsquery Configuration
#
# Environment variables override these settings:
# - TSQUERY_API_HOST
# - TSQUERY_API_PORT
# - TSQUERY_HTTP_TIMEOUT_SECS
# - TSQUERY_QUERY_TIMEOUT_SECS
# - TSQUERY_LOG_LEVEL
# - TSQUERY_LOG_FORMAT

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8086

# Allowed CORS origins; empty allows any origin
cors_origins = []

# Whole-request deadline in seconds; slower requests get 408
request_timeout_secs = 30

[query]
# Target number of buckets per panel
default_resolution = 30

# Per-query backend deadline in seconds
# query_timeout_secs = 10

[http]
# Outbound request timeout in seconds
timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

[[datasources]]
name = "metrics"
type = "influxdb"
url = "http://localhost:8086"
database = "telegraf"

[[datasources]]
name = "logs"
type = "elasticsearch"
url = "http://localhost:9200"
database = "[logs-]YYYY.MM.DD"
json_data = { timeField = "@timestamp", esVersion = 56, interval = "Daily" }
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_template_loads() {
        let file = write_config(&generate_default_config());
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.api.port, 8086);
        assert_eq!(config.query.default_resolution, 30);
        assert_eq!(config.query.query_timeout(), None);
        assert_eq!(config.datasources.len(), 2);

        let logs = config.datasource("logs").unwrap();
        assert_eq!(logs.backend_type, "elasticsearch");
        assert_eq!(logs.setting_str("timeField"), Some("@timestamp"));
        assert_eq!(logs.setting_i64("esVersion"), Some(56));
    }

    #[test]
    fn test_sections_are_optional() {
        let file = write_config("[api]\nport = 9000\n");
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.datasources.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("[api\nport = ");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/tsquery.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_duplicate_datasource_names() {
        let file = write_config(
            r#"
[[datasources]]
name = "a"
type = "influxdb"
url = "http://one"

[[datasources]]
name = "a"
type = "elasticsearch"
url = "http://two"
"#,
        );
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TSQUERY_API_PORT", "9100"),
            ("TSQUERY_LOG_FORMAT", "json"),
            ("TSQUERY_QUERY_TIMEOUT_SECS", "5"),
            ("TSQUERY_HTTP_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.port, 9100);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.query.query_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.http.timeout_secs, 30);
    }
}
