//! Elasticsearch response parser
//!
//! Walks the aggregation tree in the same order the compiler built it:
//! `terms` levels recurse and suffix their key onto every series produced
//! below them, the `date_histogram` level emits one series per visible
//! metric.

use serde_json::Value;

use crate::elasticsearch::models::{BucketKind, EsQuery, MetricKind};
use crate::tsdb::{QueryResult, TimePoint, TimeSeries};

/// Parsed output of one search
#[derive(Debug, Default)]
pub struct ParsedResponse {
    /// One result per date histogram reached, i.e. one per terms path
    pub results: Vec<QueryResult>,
    pub warnings: Vec<String>,
}

/// Convert a `_search` response body into query results
pub fn parse_response(query: &EsQuery, response: &Value) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();

    match response.get("aggregations") {
        Some(aggregations) => {
            parsed.results = process_level(query, 0, aggregations, &mut parsed.warnings)
        }
        None => tracing::debug!(ref_id = %query.ref_id, "Response carries no aggregations"),
    }

    parsed
}

fn process_level(
    query: &EsQuery,
    index: usize,
    aggregations: &Value,
    warnings: &mut Vec<String>,
) -> Vec<QueryResult> {
    let Some(agg) = query.bucket_aggs.get(index) else {
        return Vec::new();
    };

    if let BucketKind::Unsupported(name) = &agg.kind {
        tracing::info!(ref_id = %query.ref_id, agg_type = %name, "Aggregation type currently not supported");
        let message = format!("bucket aggregation '{}' is not supported in responses", name);
        if !warnings.contains(&message) {
            warnings.push(message);
        }
        return Vec::new();
    }

    let Some(buckets) = aggregations.get(&agg.id).and_then(buckets_of) else {
        tracing::info!(ref_id = %query.ref_id, agg_id = %agg.id, "Can not find aggregation in response");
        return Vec::new();
    };

    match &agg.kind {
        BucketKind::DateHistogram(_) => vec![process_date_histogram(query, &buckets, warnings)],
        BucketKind::Terms(_) => {
            let mut results = Vec::new();
            for bucket in buckets {
                let key = term_key(bucket);
                for mut result in process_level(query, index + 1, bucket, warnings) {
                    for series in &mut result.series {
                        series.name.push_str(&key);
                    }
                    results.push(result);
                }
            }
            results
        }
        BucketKind::Unsupported(_) => Vec::new(),
    }
}

fn process_date_histogram(
    query: &EsQuery,
    buckets: &[&Value],
    warnings: &mut Vec<String>,
) -> QueryResult {
    let mut result = QueryResult::new(query.ref_id.clone());

    for metric in query.metrics.iter().filter(|m| !m.hide) {
        if metric.kind.is_multi_value() || matches!(metric.kind, MetricKind::Unsupported(_)) {
            let message = format!(
                "metric '{}' is not supported in responses",
                metric.kind.type_name()
            );
            if !warnings.contains(&message) {
                warnings.push(message);
            }
            continue;
        }

        let mut points: Vec<TimePoint> = buckets
            .iter()
            .filter_map(|bucket| {
                let timestamp = bucket.get("key").and_then(Value::as_f64)?;
                let value = bucket
                    .get(&metric.id)
                    .and_then(|m| m.get("value"))
                    .and_then(Value::as_f64)
                    .or_else(|| bucket.get("doc_count").and_then(Value::as_f64));
                Some(TimePoint::new(value, timestamp))
            })
            .collect();
        points.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        let name = format!("{}{}", query.series_prefix(), metric.id);
        result.series.push(TimeSeries::new(name, points));
    }

    result
}

/// Buckets arrive as an array, or as an object when `keyed` is set
fn buckets_of(agg: &Value) -> Option<Vec<&Value>> {
    match agg.get("buckets")? {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(items) => Some(items.values().collect()),
        _ => None,
    }
}

fn term_key(bucket: &Value) -> String {
    if let Some(key) = bucket.get("key_as_string").and_then(Value::as_str) {
        return key.to_string();
    }

    match bucket.get("key") {
        Some(Value::String(key)) => key.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
