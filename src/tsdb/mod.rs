//! Query Execution Core
//!
//! Backend-agnostic pieces shared by every data source:
//!
//! - **types**: TimeRange, Query, QueryContext, TimeSeries, BatchResult
//! - **interval**: Interval quantization onto a fixed ladder
//! - **time_range**: Relative bound expressions → epoch ms / InfluxQL
//! - **executor**: Executor trait, registry and dispatcher
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! QueryContext + DataSourceInfo
//!   → ExecutorRegistry::resolve
//!   → Executor::execute (compile → backend I/O → parse, per query)
//!   → BatchResult { results, failures, warnings }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tsquery::tsdb::{handle_request, DataSourceInfo, Query, QueryContext, TimeRange};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = tsquery::default_registry(reqwest::Client::new());
//!
//!     let ds = DataSourceInfo::new("metrics", "influxdb", "http://localhost:8086")
//!         .database("telegraf");
//!
//!     let query = Query::new("A", json!({
//!         "measurement": "cpu",
//!         "select": [[{"type": "field", "params": ["usage_idle"]}, {"type": "mean", "params": []}]],
//!         "groupBy": [{"type": "time", "params": ["auto"]}],
//!     }));
//!
//!     let context = QueryContext::new(TimeRange::new("6h", "now"), vec![query]);
//!     let batch = handle_request(&registry, &ds, &context).await?;
//!
//!     for (key, result) in &batch.results {
//!         println!("{}: {} series", key, result.series.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod executor;
pub mod interval;
pub mod time_range;
pub mod types;

pub use error::{FailureKind, TsdbError, TsdbResult};
pub use executor::{handle_request, run_concurrently, Executor, ExecutorFactory, ExecutorRegistry};
pub use interval::{calculate_interval, interval_for_span, Interval, DEFAULT_RESOLUTION};
pub use time_range::{parse_duration_ms, parse_time_expr, TimeExpr, NOW_OFFSET_MS};
pub use types::{
    BatchResult, DataSourceInfo, Query, QueryContext, QueryFailure, QueryResult, TimePoint,
    TimeRange, TimeSeries,
};
