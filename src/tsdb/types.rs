//! Core data types for query execution
//!
//! This module defines the envelope that flows through every executor:
//! - `TimeRange`: the dashboard's relative or absolute bounds
//! - `Query` / `QueryContext`: what to run
//! - `TimeSeries` / `QueryResult` / `BatchResult`: what comes back
//! - `DataSourceInfo`: the resolved backend configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::tsdb::error::{FailureKind, TsdbError, TsdbResult};
use crate::tsdb::time_range;

/// A time interval expressed as dashboard bound expressions
///
/// `now` is captured once so that both bounds resolve against the same
/// instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    /// Lower bound, e.g. "6h", "now-6h" or epoch milliseconds
    pub from: String,
    /// Upper bound, e.g. "now"
    pub to: String,
    /// Reference instant for relative bounds
    pub now: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range resolved against the current wall clock
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::at(from, to, Utc::now())
    }

    /// Create a range resolved against a fixed instant
    pub fn at(from: impl Into<String>, to: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            now,
        }
    }

    /// Lower bound in epoch milliseconds
    pub fn from_epoch_ms(&self) -> TsdbResult<i64> {
        time_range::to_epoch_ms(&self.from, self.now)
    }

    /// Upper bound in epoch milliseconds (an empty bound means `now`)
    pub fn to_epoch_ms(&self) -> TsdbResult<i64> {
        if self.to.trim().is_empty() {
            return time_range::to_epoch_ms("now", self.now);
        }
        time_range::to_epoch_ms(&self.to, self.now)
    }

    /// Both bounds in epoch milliseconds, rejecting negative spans
    pub fn epoch_bounds(&self) -> TsdbResult<(i64, i64)> {
        let from = self.from_epoch_ms()?;
        let to = self.to_epoch_ms()?;

        if from > to {
            return Err(TsdbError::Compile(format!(
                "time range '{}' to '{}' has a negative span",
                self.from, self.to
            )));
        }

        Ok((from, to))
    }
}

/// A single sample: `[value, timestamp_ms]` on the wire
///
/// The value is absent when the backend reported no data for the slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint(pub Option<f64>, pub f64);

impl TimePoint {
    pub fn new(value: Option<f64>, timestamp: f64) -> Self {
        Self(value, timestamp)
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn timestamp(&self) -> f64 {
        self.1
    }
}

/// A named, time-ascending sequence of points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    pub points: Vec<TimePoint>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, points: Vec<TimePoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Series produced for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub ref_id: String,
    pub series: Vec<TimeSeries>,
}

impl QueryResult {
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            series: Vec::new(),
        }
    }

    /// Key under which this result is stored in a batch:
    /// the first series name when present, otherwise the ref id
    pub fn output_key(&self) -> &str {
        self.series
            .first()
            .map(|s| s.name.as_str())
            .unwrap_or(&self.ref_id)
    }
}

/// Why a query has no entry in the batch results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFailure {
    pub ref_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Merged output of one executor run
///
/// A ref id with no entry in `results` did not succeed; `failures` says why.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub results: BTreeMap<String, QueryResult>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, QueryFailure>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub warnings: BTreeMap<String, Vec<String>>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a query result under its output key.
    ///
    /// When the key is already taken the result falls back to its ref id
    /// (suffixed until unique) and a warning names the collision, so no
    /// successful query disappears from `results`.
    pub fn insert(&mut self, result: QueryResult) {
        let key = result.output_key().to_string();
        self.insert_keyed(key, result);
    }

    fn insert_keyed(&mut self, key: String, result: QueryResult) {
        let Some(existing) = self.results.get(&key) else {
            self.results.insert(key, result);
            return;
        };

        let holder = existing.ref_id.clone();
        let fallback = self.free_key(&result.ref_id);
        self.warn(
            &result.ref_id,
            format!(
                "output key '{}' already used by ref id '{}', stored under '{}'",
                key, holder, fallback
            ),
        );
        self.results.insert(fallback, result);
    }

    fn free_key(&self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 2;
        while self.results.contains_key(&candidate) {
            candidate = format!("{}#{}", base, n);
            n += 1;
        }
        candidate
    }

    /// Record that a query was dropped
    pub fn fail(&mut self, ref_id: &str, err: &TsdbError) {
        self.failures.insert(
            ref_id.to_string(),
            QueryFailure {
                ref_id: ref_id.to_string(),
                kind: err.failure_kind(),
                message: err.to_string(),
            },
        );
    }

    /// Record a soft, non-fatal limitation hit while running a query
    pub fn warn(&mut self, ref_id: &str, message: impl Into<String>) {
        self.warnings
            .entry(ref_id.to_string())
            .or_default()
            .push(message.into());
    }

    /// Fold another batch into this one
    pub fn merge(&mut self, other: BatchResult) {
        for (key, result) in other.results {
            self.insert_keyed(key, result);
        }
        self.failures.extend(other.failures);
        for (ref_id, mut messages) in other.warnings {
            self.warnings.entry(ref_id).or_default().append(&mut messages);
        }
    }

    /// Ref ids that produced at least one result
    pub fn ref_ids(&self) -> impl Iterator<Item = &str> {
        self.results.values().map(|r| r.ref_id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A backend-agnostic panel query
///
/// `model` is the raw descriptor; each executor deserializes it into its
/// own typed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub ref_id: String,
    pub model: serde_json::Value,
}

impl Query {
    pub fn new(ref_id: impl Into<String>, model: serde_json::Value) -> Self {
        Self {
            ref_id: ref_id.into(),
            model,
        }
    }
}

/// Per-request envelope handed to an executor
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub time_range: TimeRange,
    pub queries: Vec<Query>,
    /// Deadline for each backend call
    pub timeout: Option<Duration>,
    /// Target bucket count for interval quantization
    pub resolution: Option<u32>,
}

impl QueryContext {
    pub fn new(time_range: TimeRange, queries: Vec<Query>) -> Self {
        Self {
            time_range,
            queries,
            timeout: None,
            resolution: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resolution(mut self, resolution: u32) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/// Resolved data source configuration supplied by the persistence layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub backend_type: String,
    pub url: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub basic_auth: bool,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub basic_auth_password: String,
    #[serde(default)]
    pub json_data: serde_json::Value,
}

impl DataSourceInfo {
    pub fn new(
        name: impl Into<String>,
        backend_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backend_type: backend_type.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Builder method: set the database or index name
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Builder method: set backend-specific settings
    pub fn json_data(mut self, json_data: serde_json::Value) -> Self {
        self.json_data = json_data;
        self
    }

    /// Builder method: enable basic auth
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = true;
        self.basic_auth_user = user.into();
        self.basic_auth_password = password.into();
        self
    }

    /// Look up a string setting in `json_data`
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.json_data
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Look up an integer setting in `json_data`, accepting numeric strings
    pub fn setting_i64(&self, key: &str) -> Option<i64> {
        match self.json_data.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}
