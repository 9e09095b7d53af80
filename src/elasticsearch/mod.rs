//! Elasticsearch backend
//!
//! Compiles panel queries into `_search` bodies with nested bucket and metric
//! aggregations, and flattens the aggregation response into time series.
//!
//! - **models**: Query descriptor with typed aggregation kinds
//! - **datasource**: Data source settings and index pattern expansion
//! - **compiler**: Bool query + aggregation tree
//! - **parser**: Aggregation response → series
//! - **executor**: HTTP transport and [`Executor`](crate::tsdb::Executor) impl
//!
//! # Architecture
//!
//! ```text
//! Query.model → EsQuery → build_search → POST {index}/_search
//!             → parse_response → BatchResult
//! ```

pub mod compiler;
pub mod datasource;
pub mod executor;
pub mod models;
pub mod parser;

pub use compiler::{build_search, SearchRequest};
pub use datasource::{ElasticDatasource, IndexInterval};
pub use executor::ElasticsearchExecutor;
pub use models::{BucketAgg, BucketKind, EsQuery, MetricAgg, MetricKind};
pub use parser::{parse_response, ParsedResponse};

use crate::tsdb::{Executor, ExecutorRegistry};

/// Data source type served by this backend
pub const BACKEND_TYPE: &str = "elasticsearch";

/// Register the Elasticsearch factory, sharing `client` across executors
pub fn register(registry: &mut ExecutorRegistry, client: reqwest::Client) {
    registry.register(BACKEND_TYPE, move |info| {
        let executor = ElasticsearchExecutor::new(info, client.clone())?;
        Ok(Box::new(executor) as Box<dyn Executor>)
    });
}
