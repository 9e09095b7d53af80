//! Executor contract and registry
//!
//! Each backend module contributes an [`ExecutorFactory`] under its type
//! name. The application root fills an [`ExecutorRegistry`] once at startup,
//! then shares it (typically behind an `Arc`) with the request path, which
//! only ever reads from it.
//!
//! # Dispatch
//!
//! ```text
//! DataSourceInfo.type → Registry → Factory(ds) → Executor.execute → BatchResult
//! ```

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::tsdb::error::{TsdbError, TsdbResult};
use crate::tsdb::types::{BatchResult, DataSourceInfo, Query, QueryContext};

/// Compiles, runs and flattens queries for one data source
#[async_trait]
pub trait Executor: Send + Sync {
    /// Backend type name this executor serves
    fn backend(&self) -> &str;

    /// Run a batch of queries.
    ///
    /// Per-query failures never surface as an error: the failed ref id is
    /// left out of `results` and recorded in `failures`.
    async fn execute(&self, queries: &[Query], context: &QueryContext) -> BatchResult;
}

/// Builds an executor bound to a data source, failing on bad configuration
pub type ExecutorFactory =
    Arc<dyn Fn(&DataSourceInfo) -> TsdbResult<Box<dyn Executor>> + Send + Sync>;

/// Backend type name → executor factory
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    factories: HashMap<String, ExecutorFactory>,
}

impl ExecutorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration for the same type wins
    pub fn register<F>(&mut self, backend_type: impl Into<String>, factory: F)
    where
        F: Fn(&DataSourceInfo) -> TsdbResult<Box<dyn Executor>> + Send + Sync + 'static,
    {
        let backend_type = backend_type.into();
        if self
            .factories
            .insert(backend_type.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!(backend = %backend_type, "Replacing registered executor factory");
        } else {
            tracing::debug!(backend = %backend_type, "Registered executor factory");
        }
    }

    /// Build the executor for a data source
    pub fn resolve(&self, ds: &DataSourceInfo) -> TsdbResult<Box<dyn Executor>> {
        let factory = self
            .factories
            .get(&ds.backend_type)
            .ok_or_else(|| TsdbError::UnknownBackend(ds.backend_type.clone()))?;

        factory(ds)
    }

    /// Check whether a backend type has a factory
    pub fn contains(&self, backend_type: &str) -> bool {
        self.factories.contains_key(backend_type)
    }

    /// Registered backend type names, sorted
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

/// Resolve the executor for `ds` and run every query in the context.
///
/// Only registry resolution and executor construction errors are returned.
pub async fn handle_request(
    registry: &ExecutorRegistry,
    ds: &DataSourceInfo,
    context: &QueryContext,
) -> TsdbResult<BatchResult> {
    let executor = registry.resolve(ds)?;

    tracing::debug!(
        backend = executor.backend(),
        datasource = %ds.name,
        queries = context.queries.len(),
        "Dispatching query batch"
    );

    Ok(executor.execute(&context.queries, context).await)
}

/// Run one future per query concurrently and fold the outcomes into a batch.
///
/// Each future yields either the results for its query or the error that
/// dropped it. When the context carries a timeout, a query that exceeds it is
/// dropped as well and its in-flight call is cancelled.
pub async fn run_concurrently<'a, F, Fut>(
    queries: &'a [Query],
    context: &QueryContext,
    run: F,
) -> BatchResult
where
    F: Fn(&'a Query) -> Fut,
    Fut: Future<Output = TsdbResult<BatchResult>> + 'a,
{
    let timeout = context.timeout;

    let outcomes = join_all(queries.iter().map(|query| {
        let fut = run(query);
        async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TsdbError::Timeout(format!(
                        "no answer within {} ms",
                        limit.as_millis()
                    ))),
                },
                None => fut.await,
            };
            (query, outcome)
        }
    }))
    .await;

    let mut batch = BatchResult::new();
    for (query, outcome) in outcomes {
        match outcome {
            Ok(partial) => batch.merge(partial),
            Err(e) => {
                tracing::warn!(ref_id = %query.ref_id, error = %e, "Query dropped from batch");
                batch.fail(&query.ref_id, &e);
            }
        }
    }

    batch
}
