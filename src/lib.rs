//! # tsquery
//!
//! Backend-agnostic time-series query execution. Dashboard panel queries are
//! dispatched to a per-backend executor that compiles them into the backend's
//! native query language, runs them over HTTP and flattens the response into
//! named time series.
//!
//! ## Modules
//!
//! - [`tsdb`]: Executor contract, registry, interval calculator, time ranges
//! - [`elasticsearch`]: Aggregation compiler and response flattening
//! - [`influxdb`]: InfluxQL compiler and response flattening
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsquery::tsdb::{handle_request, DataSourceInfo, Query, QueryContext, TimeRange};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = tsquery::default_registry(reqwest::Client::new());
//!
//!     let ds = DataSourceInfo::new("logs", "elasticsearch", "http://localhost:9200")
//!         .database("[logs-]YYYY.MM.DD")
//!         .json_data(json!({"timeField": "@timestamp", "esVersion": 56, "interval": "Daily"}));
//!
//!     let query = Query::new("A", json!({
//!         "query": "status:500",
//!         "metrics": [{"id": "1", "type": "count"}],
//!         "bucketAggs": [{"id": "2", "type": "date_histogram", "field": "@timestamp"}],
//!     }));
//!
//!     let context = QueryContext::new(TimeRange::new("24h", "now"), vec![query]);
//!     let batch = handle_request(&registry, &ds, &context).await?;
//!
//!     println!("{} series, {} failed", batch.results.len(), batch.failures.len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod elasticsearch;
pub mod influxdb;
pub mod tsdb;

// Re-export top-level types for convenience
pub use tsdb::{
    handle_request, BatchResult, DataSourceInfo, Executor, ExecutorRegistry, FailureKind, Query,
    QueryContext, QueryFailure, QueryResult, TimePoint, TimeRange, TimeSeries, TsdbError,
    TsdbResult,
};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, HttpConfig, LoggingConfig, QueryConfig};

/// Registry with every built-in backend, sharing one HTTP client
pub fn default_registry(client: reqwest::Client) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    elasticsearch::register(&mut registry, client.clone());
    influxdb::register(&mut registry, client);
    registry
}
