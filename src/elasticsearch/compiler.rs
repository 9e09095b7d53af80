//! Elasticsearch request compiler
//!
//! Builds the `_search` body for one panel query.
//!
//! # Nesting
//!
//! ```text
//! first compiled bucket    → top-level aggregation
//! every later bucket       → child of the most recent `terms` aggregation
//! every compiled metric    → child of the `date_histogram` aggregation
//! ```
//!
//! `terms` aggregations form the spine even when the date histogram comes
//! later in the list, and metrics always hang off the date histogram.

use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::elasticsearch::datasource::ElasticDatasource;
use crate::elasticsearch::models::{
    BucketAgg, BucketKind, DateHistogramSettings, EsQuery, MetricAgg, MetricKind, TermsSettings,
};
use crate::tsdb::{interval, TimeRange, TsdbError, TsdbResult};

/// A compiled search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub body: Value,
    /// Soft failures: aggregation types that were skipped
    pub warnings: Vec<String>,
}

/// One node of the aggregation tree, stored flat with a parent index
#[derive(Debug)]
struct AggNode {
    id: String,
    body: Value,
    parent: Option<usize>,
}

/// Compile a panel query against a data source and time range
pub fn build_search(
    query: &EsQuery,
    ds: &ElasticDatasource,
    range: &TimeRange,
    resolution: Option<u32>,
) -> TsdbResult<SearchRequest> {
    let (from, to) = range.epoch_bounds()?;
    let time_field = if query.time_field.is_empty() {
        ds.time_field.as_str()
    } else {
        query.time_field.as_str()
    };

    let mut warnings = Vec::new();
    let aggs = build_aggregations(query, ds, from, to, resolution, &mut warnings)?;

    let mut body = json!({
        "size": 0,
        "query": build_filter(&query.query, time_field, from, to),
    });
    if !aggs.is_empty() {
        body["aggs"] = Value::Object(aggs);
    }

    let start = Utc.timestamp_millis_opt(from).single().unwrap_or_else(Utc::now);
    let end = Utc.timestamp_millis_opt(to).single().unwrap_or_else(Utc::now);

    Ok(SearchRequest {
        indices: ds.indices(start, end),
        body,
        warnings,
    })
}

/// Boolean query: optional free text plus the mandatory time range filter
pub fn build_filter(query_string: &str, time_field: &str, from: i64, to: i64) -> Value {
    let mut range = Map::new();
    range.insert(
        time_field.to_string(),
        json!({"gte": from, "lte": to, "format": "epoch_millis"}),
    );

    let mut bool_query = json!({ "filter": [{ "range": range }] });
    if !query_string.trim().is_empty() {
        bool_query["must"] = json!([{
            "query_string": { "query": query_string, "analyze_wildcard": true }
        }]);
    }

    json!({ "bool": bool_query })
}

fn build_aggregations(
    query: &EsQuery,
    ds: &ElasticDatasource,
    from: i64,
    to: i64,
    resolution: Option<u32>,
    warnings: &mut Vec<String>,
) -> TsdbResult<Map<String, Value>> {
    let mut nodes: Vec<AggNode> = Vec::new();
    let mut terms_parent: Option<usize> = None;
    let mut histogram_parent: Option<usize> = None;

    // walk in dashboard order; the first compiled bucket is the root
    for agg in &query.bucket_aggs {
        let Some(body) = bucket_body(agg, ds, from, to, resolution) else {
            tracing::info!(ref_id = %query.ref_id, agg_type = agg.kind.type_name(), "Bucket aggregation type not supported");
            warnings.push(format!(
                "bucket aggregation '{}' is not supported",
                agg.kind.type_name()
            ));
            continue;
        };

        let parent = if nodes.is_empty() {
            None
        } else {
            Some(terms_parent.ok_or_else(|| {
                TsdbError::Compile(format!(
                    "bucket aggregation '{}' has no preceding terms aggregation to nest under",
                    agg.id
                ))
            })?)
        };

        nodes.push(AggNode {
            id: agg.id.clone(),
            body,
            parent,
        });

        match agg.kind {
            BucketKind::Terms(_) => terms_parent = Some(nodes.len() - 1),
            BucketKind::DateHistogram(_) => histogram_parent = Some(nodes.len() - 1),
            BucketKind::Unsupported(_) => {}
        }
    }

    for metric in &query.metrics {
        let body = match metric_body(metric) {
            MetricBody::Agg(body) => body,
            MetricBody::DocCount => continue,
            MetricBody::Unsupported => {
                tracing::info!(ref_id = %query.ref_id, metric_type = metric.kind.type_name(), "Metric aggregation type not supported");
                warnings.push(format!(
                    "metric aggregation '{}' is not supported",
                    metric.kind.type_name()
                ));
                continue;
            }
        };

        let parent = histogram_parent.ok_or_else(|| {
            TsdbError::Compile(format!(
                "metric '{}' requires a date_histogram bucket aggregation",
                metric.id
            ))
        })?;

        nodes.push(AggNode {
            id: metric.id.clone(),
            body,
            parent: Some(parent),
        });
    }

    let mut top = Map::new();
    for (idx, node) in nodes.iter().enumerate() {
        if node.parent.is_none() {
            top.insert(node.id.clone(), render_node(&nodes, idx));
        }
    }

    Ok(top)
}

fn render_node(nodes: &[AggNode], idx: usize) -> Value {
    let mut body = nodes[idx].body.clone();

    let children: Map<String, Value> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.parent == Some(idx))
        .map(|(child, n)| (n.id.clone(), render_node(nodes, child)))
        .collect();

    if !children.is_empty() {
        body["aggs"] = Value::Object(children);
    }

    body
}

fn bucket_body(
    agg: &BucketAgg,
    ds: &ElasticDatasource,
    from: i64,
    to: i64,
    resolution: Option<u32>,
) -> Option<Value> {
    match &agg.kind {
        BucketKind::DateHistogram(settings) => {
            Some(date_histogram_body(agg, settings, ds, from, to, resolution))
        }
        BucketKind::Terms(settings) => Some(terms_body(agg, settings, ds)),
        BucketKind::Unsupported(_) => None,
    }
}

fn date_histogram_body(
    agg: &BucketAgg,
    settings: &DateHistogramSettings,
    ds: &ElasticDatasource,
    from: i64,
    to: i64,
    resolution: Option<u32>,
) -> Value {
    let interval = settings
        .interval
        .clone()
        .unwrap_or_else(|| interval::interval_for_span(to.saturating_sub(from), resolution).text);

    let field = if agg.field.is_empty() {
        ds.time_field.as_str()
    } else {
        agg.field.as_str()
    };

    // 7.x renamed the fixed interval parameter
    let interval_key = if ds.es_version >= 70 {
        "fixed_interval"
    } else {
        "interval"
    };

    let mut body = json!({
        "field": field,
        "min_doc_count": settings.min_doc_count,
        "format": "epoch_millis",
        "extended_bounds": { "min": from, "max": to },
    });
    body[interval_key] = Value::String(interval);

    json!({ "date_histogram": body })
}

fn terms_body(agg: &BucketAgg, settings: &TermsSettings, ds: &ElasticDatasource) -> Value {
    let mut body = json!({
        "field": agg.field,
        "size": settings.size,
    });

    if let (Some(order_by), Some(order)) = (&settings.order_by, &settings.order) {
        let key = if order_by == "_term" && ds.es_version >= 60 {
            "_key"
        } else {
            order_by.as_str()
        };
        let mut order_map = Map::new();
        order_map.insert(key.to_string(), Value::String(order.clone()));
        body["order"] = Value::Object(order_map);
    }

    if let Some(min_doc_count) = settings.min_doc_count {
        body["min_doc_count"] = json!(min_doc_count);
    }

    json!({ "terms": body })
}

enum MetricBody {
    Agg(Value),
    DocCount,
    Unsupported,
}

fn metric_body(metric: &MetricAgg) -> MetricBody {
    let field_agg = |name: &str, extra: Option<(&str, Value)>| {
        let mut body = json!({ "field": metric.field });
        if let Some(script) = &metric.script {
            body["script"] = json!({ "inline": script });
        }
        if let Some((key, value)) = extra {
            body[key] = value;
        }
        let mut wrapper = Map::new();
        wrapper.insert(name.to_string(), body);
        MetricBody::Agg(Value::Object(wrapper))
    };

    match &metric.kind {
        MetricKind::Count => MetricBody::DocCount,
        MetricKind::Avg => field_agg("avg", None),
        MetricKind::Sum => field_agg("sum", None),
        MetricKind::Min => field_agg("min", None),
        MetricKind::Max => field_agg("max", None),
        MetricKind::Cardinality {
            precision_threshold,
        } => field_agg(
            "cardinality",
            precision_threshold.map(|p| ("precision_threshold", json!(p))),
        ),
        MetricKind::Percentiles { percents } => field_agg(
            "percentiles",
            (!percents.is_empty()).then(|| ("percents", json!(percents))),
        ),
        MetricKind::ExtendedStats { sigma } => {
            field_agg("extended_stats", sigma.map(|s| ("sigma", json!(s))))
        }
        MetricKind::Derivative { buckets_path } => MetricBody::Agg(json!({
            "derivative": { "buckets_path": buckets_path }
        })),
        MetricKind::MovingAvg {
            buckets_path,
            window,
            model,
        } => {
            let mut body = json!({ "buckets_path": buckets_path });
            if let Some(window) = window {
                body["window"] = json!(window);
            }
            if let Some(model) = model {
                body["model"] = json!(model);
            }
            MetricBody::Agg(json!({ "moving_avg": body }))
        }
        MetricKind::Unsupported(_) => MetricBody::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsdb::DataSourceInfo;
    use chrono::DateTime;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 10, 7, 12, 0, 0).unwrap()
    }

    fn datasource(version: i64) -> ElasticDatasource {
        ElasticDatasource::from_info(
            &DataSourceInfo::new("logs", "elasticsearch", "http://localhost:9200")
                .database("logs-*")
                .json_data(json!({"esVersion": version, "timeField": "@timestamp"})),
        )
        .unwrap()
    }

    fn query(model: Value) -> EsQuery {
        serde_json::from_value(model).unwrap()
    }

    fn compile(model: Value) -> TsdbResult<SearchRequest> {
        build_search(
            &query(model),
            &datasource(5),
            &TimeRange::at("now-1h", "now", now()),
            None,
        )
    }

    #[test]
    fn test_time_filter_and_query_string() {
        let req = compile(json!({
            "refId": "A",
            "query": "status:500",
            "metrics": [{"id": "1", "type": "count"}],
            "bucketAggs": [{"id": "2", "type": "date_histogram", "field": "@timestamp"}]
        }))
        .unwrap();

        let from = now().timestamp_millis() - 3_600_000;
        let to = now().timestamp_millis() - 30_000;
        let range = &req.body["query"]["bool"]["filter"][0]["range"]["@timestamp"];
        assert_eq!(range["gte"], json!(from));
        assert_eq!(range["lte"], json!(to));
        assert_eq!(range["format"], "epoch_millis");
        assert_eq!(
            req.body["query"]["bool"]["must"][0]["query_string"]["query"],
            "status:500"
        );
        assert_eq!(req.body["size"], 0);
        assert_eq!(req.indices, vec!["logs-*"]);
    }

    #[test]
    fn test_empty_query_string_omitted() {
        let req = compile(json!({
            "bucketAggs": [{"id": "2", "type": "date_histogram", "field": "@timestamp"}]
        }))
        .unwrap();

        assert!(req.body["query"]["bool"].get("must").is_none());
    }

    #[test]
    fn test_terms_then_histogram_nesting() {
        let req = compile(json!({
            "refId": "A",
            "metrics": [{"id": "1", "type": "count"}, {"id": "5", "type": "avg", "field": "latency"}],
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "host"},
                {"id": "3", "type": "date_histogram", "field": "@timestamp", "settings": {"interval": "1m"}}
            ]
        }))
        .unwrap();

        let aggs = &req.body["aggs"];
        assert_eq!(aggs.as_object().unwrap().len(), 1);
        assert_eq!(aggs["2"]["terms"]["field"], "host");
        assert_eq!(aggs["2"]["terms"]["size"], 20);

        let histogram = &aggs["2"]["aggs"]["3"];
        assert_eq!(histogram["date_histogram"]["interval"], "1m");

        // count compiles to nothing, avg hangs off the histogram
        let metrics = histogram["aggs"].as_object().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["5"]["avg"]["field"], "latency");
    }

    #[test]
    fn test_buckets_nest_under_latest_terms() {
        let req = compile(json!({
            "metrics": [{"id": "1", "type": "max", "field": "bytes"}],
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "dc"},
                {"id": "3", "type": "terms", "field": "host"},
                {"id": "4", "type": "date_histogram", "field": "@timestamp"}
            ]
        }))
        .unwrap();

        let host = &req.body["aggs"]["2"]["aggs"]["3"];
        assert_eq!(host["terms"]["field"], "host");
        assert_eq!(
            host["aggs"]["4"]["aggs"]["1"]["max"]["field"],
            "bytes"
        );
    }

    #[test]
    fn test_histogram_first_then_terms_is_rejected() {
        let err = compile(json!({
            "bucketAggs": [
                {"id": "2", "type": "date_histogram", "field": "@timestamp"},
                {"id": "3", "type": "terms", "field": "host"}
            ]
        }))
        .unwrap_err();

        assert!(matches!(err, TsdbError::Compile(_)));
    }

    #[test]
    fn test_metric_without_histogram_is_rejected() {
        let err = compile(json!({
            "metrics": [{"id": "1", "type": "sum", "field": "bytes"}],
            "bucketAggs": [{"id": "2", "type": "terms", "field": "host"}]
        }))
        .unwrap_err();

        assert!(matches!(err, TsdbError::Compile(_)));
    }

    #[test]
    fn test_auto_interval_uses_calculator() {
        let req = compile(json!({
            "bucketAggs": [{"id": "2", "type": "date_histogram", "field": "@timestamp", "settings": {"interval": "auto", "min_doc_count": 0}}]
        }))
        .unwrap();

        // (1h - 30s) / 30 = 119s -> 2m
        let histogram = &req.body["aggs"]["2"]["date_histogram"];
        assert_eq!(histogram["interval"], "2m");
        assert_eq!(histogram["min_doc_count"], 0);
        assert_eq!(
            histogram["extended_bounds"]["min"],
            json!(now().timestamp_millis() - 3_600_000)
        );
    }

    #[test]
    fn test_metric_mapping() {
        let req = compile(json!({
            "metrics": [
                {"id": "1", "type": "cardinality", "field": "user", "settings": {"precision_threshold": "1000"}},
                {"id": "2", "type": "percentiles", "field": "latency", "settings": {"percents": ["95", "99"]}},
                {"id": "3", "type": "extended_stats", "field": "latency", "settings": {"sigma": 3}},
                {"id": "4", "type": "derivative", "field": "1"},
                {"id": "5", "type": "moving_avg", "field": "1", "settings": {"window": 5}},
                {"id": "6", "type": "sum", "field": "bytes", "settings": {"script": {"inline": "_value / 1024"}}}
            ],
            "bucketAggs": [{"id": "10", "type": "date_histogram", "field": "@timestamp"}]
        }))
        .unwrap();

        let metrics = &req.body["aggs"]["10"]["aggs"];
        assert_eq!(metrics["1"]["cardinality"]["precision_threshold"], 1000);
        assert_eq!(metrics["2"]["percentiles"]["percents"], json!([95.0, 99.0]));
        assert_eq!(metrics["3"]["extended_stats"]["sigma"], json!(3.0));
        assert_eq!(metrics["4"]["derivative"]["buckets_path"], "1");
        assert_eq!(metrics["5"]["moving_avg"]["window"], 5);
        assert_eq!(metrics["6"]["sum"]["script"]["inline"], "_value / 1024");
    }

    #[test]
    fn test_unsupported_types_are_skipped() {
        let req = compile(json!({
            "metrics": [{"id": "1", "type": "top_hits"}, {"id": "3", "type": "avg", "field": "x"}],
            "bucketAggs": [
                {"id": "2", "type": "date_histogram", "field": "@timestamp"}
            ]
        }))
        .unwrap();

        let metrics = req.body["aggs"]["2"]["aggs"].as_object().unwrap();
        assert!(!metrics.contains_key("1"));
        assert!(metrics.contains_key("3"));
        assert_eq!(req.warnings.len(), 1);
    }

    #[test]
    fn test_unsupported_first_bucket_promotes_next() {
        let req = compile(json!({
            "metrics": [{"id": "1", "type": "count"}],
            "bucketAggs": [
                {"id": "2", "type": "geohash_grid", "field": "location"},
                {"id": "3", "type": "date_histogram", "field": "@timestamp"}
            ]
        }))
        .unwrap();

        let aggs = req.body["aggs"].as_object().unwrap();
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs["3"]["date_histogram"]["field"], "@timestamp");
        assert_eq!(req.warnings.len(), 1);
    }

    #[test]
    fn test_hidden_metric_is_still_compiled() {
        let req = compile(json!({
            "metrics": [
                {"id": "1", "type": "avg", "field": "bytes", "hide": true},
                {"id": "4", "type": "derivative", "field": "1"}
            ],
            "bucketAggs": [{"id": "2", "type": "date_histogram", "field": "@timestamp"}]
        }))
        .unwrap();

        let metrics = &req.body["aggs"]["2"]["aggs"];
        assert_eq!(metrics["1"]["avg"]["field"], "bytes");
        assert_eq!(metrics["4"]["derivative"]["buckets_path"], "1");
    }

    #[test]
    fn test_extreme_range_does_not_overflow() {
        let model = json!({
            "bucketAggs": [{"id": "2", "type": "date_histogram", "field": "@timestamp"}]
        });
        let range = TimeRange::at("100y", "9223372036854775807", now());

        let req = build_search(&query(model), &datasource(5), &range, None).unwrap();
        assert_eq!(req.body["aggs"]["2"]["date_histogram"]["interval"], "365d");
    }

    #[test]
    fn test_version_specific_keys() {
        let model = json!({
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "host", "settings": {"order": "asc", "orderBy": "_term"}},
                {"id": "3", "type": "date_histogram", "field": "@timestamp", "settings": {"interval": "10s"}}
            ]
        });
        let range = TimeRange::at("now-1h", "now", now());

        let req = build_search(&query(model), &datasource(70), &range, None).unwrap();
        assert_eq!(req.body["aggs"]["2"]["terms"]["order"]["_key"], "asc");
        assert_eq!(
            req.body["aggs"]["2"]["aggs"]["3"]["date_histogram"]["fixed_interval"],
            "10s"
        );
    }
}
