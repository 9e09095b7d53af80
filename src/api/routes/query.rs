//! Query Routes
//!
//! - POST /api/tsdb/query - Run a batch of panel queries

use axum::{extract::State, Json};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::api::dto::QueryRequest;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::tsdb::{handle_request, BatchResult, Query, QueryContext, TimeRange};

/// POST /api/tsdb/query
///
/// Groups queries by data source, dispatches each group through the
/// executor registry and merges the batches. Per-query failures come back in
/// `failures`; only unknown data sources and executor construction errors
/// fail the request.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Json<BatchResult>> {
    if req.queries.is_empty() {
        return Err(ApiError::Validation("queries cannot be empty".to_string()));
    }

    let mut seen = HashSet::new();
    for item in &req.queries {
        if item.ref_id.is_empty() {
            return Err(ApiError::Validation("every query needs a refId".to_string()));
        }
        if !seen.insert(item.ref_id.clone()) {
            return Err(ApiError::Validation(format!(
                "duplicate refId '{}'",
                item.ref_id
            )));
        }
    }

    let time_range = TimeRange::new(req.from, req.to);
    time_range
        .epoch_bounds()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut groups: BTreeMap<String, Vec<Query>> = BTreeMap::new();
    for item in req.queries {
        groups
            .entry(item.datasource.clone())
            .or_default()
            .push(item.into_query());
    }

    let mut dispatches = Vec::with_capacity(groups.len());
    for (name, queries) in groups {
        let ds = state
            .datasource(&name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("data source '{}'", name)))?;
        let registry = Arc::clone(&state.registry);

        let mut context = QueryContext::new(time_range.clone(), queries)
            .resolution(req.resolution.unwrap_or(state.config.default_resolution));
        if let Some(timeout) = state.config.query_timeout {
            context = context.timeout(timeout);
        }

        dispatches.push(async move { handle_request(&registry, &ds, &context).await });
    }

    let mut batch = BatchResult::new();
    for outcome in join_all(dispatches).await {
        batch.merge(outcome?);
    }

    tracing::debug!(
        results = batch.results.len(),
        failures = batch.failures.len(),
        "Query batch complete"
    );

    Ok(Json(batch))
}
