//! InfluxDB executor

use async_trait::async_trait;

use crate::influxdb::compiler::build_query;
use crate::influxdb::models::{InfluxQuery, InfluxResponse};
use crate::influxdb::parser::parse_response;
use crate::influxdb::BACKEND_TYPE;
use crate::tsdb::{
    run_concurrently, BatchResult, DataSourceInfo, Executor, Query, QueryContext, TsdbError,
    TsdbResult,
};

/// Executor bound to one InfluxDB data source
pub struct InfluxdbExecutor {
    info: DataSourceInfo,
    client: reqwest::Client,
}

impl InfluxdbExecutor {
    pub fn new(info: &DataSourceInfo, client: reqwest::Client) -> TsdbResult<Self> {
        if info.database.is_empty() {
            return Err(TsdbError::Config(
                "InfluxDB requires a database name".to_string(),
            ));
        }

        Ok(Self {
            info: info.clone(),
            client,
        })
    }

    async fn run_query(&self, query: &Query, context: &QueryContext) -> TsdbResult<BatchResult> {
        let mut influx_query: InfluxQuery = serde_json::from_value(query.model.clone())?;
        if influx_query.ref_id.is_empty() {
            influx_query.ref_id = query.ref_id.clone();
        }

        let compiled = build_query(&influx_query, &context.time_range, context.resolution)?;
        tracing::debug!(ref_id = %influx_query.ref_id, query = %compiled.text, "InfluxDB query");

        let response = self.send(&compiled.text).await?;
        let result = parse_response(&influx_query, &response);

        let mut batch = BatchResult::new();
        batch.insert(result);
        for warning in compiled.warnings {
            batch.warn(&influx_query.ref_id, warning);
        }

        Ok(batch)
    }

    async fn send(&self, statement: &str) -> TsdbResult<InfluxResponse> {
        let url = format!("{}/query", self.info.base_url());

        let mut params = vec![
            ("db", self.info.database.as_str()),
            ("q", statement),
            ("epoch", "ms"),
        ];
        if !self.info.user.is_empty() {
            params.push(("u", self.info.user.as_str()));
        }
        if !self.info.password.is_empty() {
            params.push(("p", self.info.password.as_str()));
        }

        let mut request = self.client.get(&url).query(&params);
        if self.info.basic_auth {
            request = request.basic_auth(
                &self.info.basic_auth_user,
                Some(&self.info.basic_auth_password),
            );
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TsdbError::Transport(format!(
                "InfluxDB returned {}: {}",
                status,
                text.trim()
            )));
        }

        let body: InfluxResponse = response.json().await?;
        if let Some(error) = body.error() {
            return Err(TsdbError::Transport(error.to_string()));
        }

        Ok(body)
    }
}

#[async_trait]
impl Executor for InfluxdbExecutor {
    fn backend(&self) -> &str {
        BACKEND_TYPE
    }

    async fn execute(&self, queries: &[Query], context: &QueryContext) -> BatchResult {
        run_concurrently(queries, context, |query| self.run_query(query, context)).await
    }
}
