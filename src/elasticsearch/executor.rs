//! Elasticsearch executor
//!
//! One `_search` call per panel query; queries in a batch run concurrently.

use async_trait::async_trait;
use serde_json::Value;

use crate::elasticsearch::compiler::{build_search, SearchRequest};
use crate::elasticsearch::datasource::ElasticDatasource;
use crate::elasticsearch::models::EsQuery;
use crate::elasticsearch::parser::parse_response;
use crate::elasticsearch::BACKEND_TYPE;
use crate::tsdb::{
    run_concurrently, BatchResult, DataSourceInfo, Executor, Query, QueryContext, QueryResult,
    TsdbError, TsdbResult,
};

/// Executor bound to one Elasticsearch data source
pub struct ElasticsearchExecutor {
    datasource: ElasticDatasource,
    client: reqwest::Client,
}

impl ElasticsearchExecutor {
    /// Validate the data source settings and bind the shared HTTP client
    pub fn new(info: &DataSourceInfo, client: reqwest::Client) -> TsdbResult<Self> {
        Ok(Self {
            datasource: ElasticDatasource::from_info(info)?,
            client,
        })
    }

    async fn run_query(&self, query: &Query, context: &QueryContext) -> TsdbResult<BatchResult> {
        let mut es_query: EsQuery = serde_json::from_value(query.model.clone())?;
        if es_query.ref_id.is_empty() {
            es_query.ref_id = query.ref_id.clone();
        }

        let search = build_search(
            &es_query,
            &self.datasource,
            &context.time_range,
            context.resolution,
        )?;
        let response = self.search(&search).await?;
        let parsed = parse_response(&es_query, &response);

        let mut batch = BatchResult::new();
        if parsed.results.is_empty() {
            batch.insert(QueryResult::new(es_query.ref_id.clone()));
        }
        for result in parsed.results {
            batch.insert(result);
        }
        for warning in search.warnings.into_iter().chain(parsed.warnings) {
            batch.warn(&es_query.ref_id, warning);
        }

        Ok(batch)
    }

    async fn search(&self, search: &SearchRequest) -> TsdbResult<Value> {
        let url = format!(
            "{}/{}/_search",
            self.datasource.info.base_url(),
            search.indices.join(",")
        );
        tracing::debug!(url = %url, body = %search.body, "Elasticsearch search");

        let info = &self.datasource.info;
        let mut request = self
            .client
            .post(&url)
            .query(&[("ignore_unavailable", "true")])
            .json(&search.body);
        if info.basic_auth {
            request = request.basic_auth(&info.basic_auth_user, Some(&info.basic_auth_password));
        }

        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            return Err(TsdbError::Transport(format!(
                "Elasticsearch returned {}: {}",
                status,
                error_reason(&body)
            )));
        }
        if body.get("error").is_some() {
            return Err(TsdbError::Transport(error_reason(&body)));
        }

        Ok(body)
    }
}

fn error_reason(body: &Value) -> String {
    match body.get("error") {
        Some(Value::String(reason)) => reason.clone(),
        Some(error) => error
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        None => body.to_string(),
    }
}

#[async_trait]
impl Executor for ElasticsearchExecutor {
    fn backend(&self) -> &str {
        BACKEND_TYPE
    }

    async fn execute(&self, queries: &[Query], context: &QueryContext) -> BatchResult {
        run_concurrently(queries, context, |query| self.run_query(query, context)).await
    }
}
