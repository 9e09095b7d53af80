//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::tsdb::{DataSourceInfo, ExecutorRegistry, DEFAULT_RESOLUTION};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Backend factories, filled once at startup
    pub registry: Arc<ExecutorRegistry>,
    /// Configured data sources by name
    pub datasources: Arc<HashMap<String, DataSourceInfo>>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        registry: ExecutorRegistry,
        datasources: Vec<DataSourceInfo>,
        config: ApiConfig,
    ) -> Self {
        let datasources = datasources
            .into_iter()
            .map(|ds| (ds.name.clone(), ds))
            .collect();

        Self {
            registry: Arc::new(registry),
            datasources: Arc::new(datasources),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn datasource(&self, name: &str) -> Option<&DataSourceInfo> {
        self.datasources.get(name)
    }

    /// Data sources whose type has no registered executor
    pub fn unserved_datasources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .datasources
            .values()
            .filter(|ds| !self.registry.contains(&ds.backend_type))
            .map(|ds| ds.name.as_str())
            .collect();
        names.sort();
        names
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Whole-request deadline, answered with 408 when exceeded
    pub request_timeout: Duration,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Target bucket count when the request does not set one
    pub default_resolution: u32,
    /// Per-query backend deadline
    pub query_timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8086,
            request_timeout: Duration::from_secs(30),
            cors_origins: Vec::new(),
            max_body_size: 2 * 1024 * 1024,
            default_resolution: DEFAULT_RESOLUTION,
            query_timeout: None,
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Take the server-facing settings from a loaded config file
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.api.host.clone(),
            port: config.api.port,
            request_timeout: Duration::from_secs(config.api.request_timeout_secs),
            cors_origins: config.api.cors_origins.clone(),
            default_resolution: config.query.default_resolution,
            query_timeout: config.query.query_timeout(),
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
