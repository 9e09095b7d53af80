//! InfluxDB backend
//!
//! - **models**: Query descriptor and `/query` response shapes
//! - **query_part**: Select / group-by part rendering
//! - **compiler**: InfluxQL statement builder and macro substitution
//! - **parser**: Rows → series, alias templates
//! - **executor**: HTTP transport and [`Executor`](crate::tsdb::Executor) impl
//!
//! # Architecture
//!
//! ```text
//! Query.model → InfluxQuery → build_query → GET /query?db=&q=&epoch=ms
//!             → parse_response → BatchResult
//! ```

pub mod compiler;
pub mod executor;
pub mod models;
pub mod parser;
pub mod query_part;

pub use compiler::{build_query, CompiledQuery};
pub use executor::InfluxdbExecutor;
pub use models::{InfluxQuery, InfluxResponse, PartDef, TagFilter};
pub use query_part::QueryPart;

use crate::tsdb::{Executor, ExecutorRegistry};

/// Data source type served by this backend
pub const BACKEND_TYPE: &str = "influxdb";

/// Register the InfluxDB factory, sharing `client` across executors
pub fn register(registry: &mut ExecutorRegistry, client: reqwest::Client) {
    registry.register(BACKEND_TYPE, move |info| {
        let executor = InfluxdbExecutor::new(info, client.clone())?;
        Ok(Box::new(executor) as Box<dyn Executor>)
    });
}
