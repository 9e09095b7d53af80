//! InfluxDB response parser
//!
//! Every non-time column of every row becomes one series. Names come from
//! the alias template when the query has one, otherwise from
//! `measurement.column { tag: value ... }`.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::influxdb::models::{InfluxQuery, InfluxResponse, Row};
use crate::tsdb::{QueryResult, TimePoint, TimeSeries};

/// `$token` or `[[token]]`
fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(\w+)|\[\[([\s\S]+?)\]\]").expect("alias pattern is a valid regex")
    })
}

/// Flatten a response into one query result
pub fn parse_response(query: &InfluxQuery, response: &InfluxResponse) -> QueryResult {
    let mut result = QueryResult::new(query.ref_id.clone());
    for row in response.results.iter().flat_map(|r| &r.series) {
        result.series.extend(transform_row(row, query));
    }

    result
}

fn transform_row(row: &Row, query: &InfluxQuery) -> Vec<TimeSeries> {
    let time_index = row.columns.iter().position(|c| c == "time").unwrap_or(0);

    row.columns
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != time_index)
        .map(|(i, column)| {
            let points = row
                .values
                .iter()
                .filter_map(|values| parse_point(values, time_index, i))
                .collect();

            let name = if query.alias.is_empty() {
                default_name(row, column)
            } else {
                format_alias(&query.alias, row, column)
            };

            TimeSeries::new(name, points)
        })
        .collect()
}

/// `None` when the timestamp is missing or not a number
fn parse_point(values: &[Value], time_index: usize, value_index: usize) -> Option<TimePoint> {
    let timestamp = values.get(time_index).and_then(Value::as_f64)?;
    let value = values.get(value_index).and_then(Value::as_f64);
    Some(TimePoint::new(value, timestamp))
}

fn default_name(row: &Row, column: &str) -> String {
    let tags: Vec<String> = row
        .tags
        .iter()
        .flatten()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();

    if tags.is_empty() {
        format!("{}.{}", row.name, column)
    } else {
        format!("{}.{} {{ {} }}", row.name, column, tags.join(" "))
    }
}

/// Expand `$token` / `[[token]]` references in an alias template
pub fn format_alias(alias: &str, row: &Row, column: &str) -> String {
    let segments: Vec<&str> = row.name.split('.').collect();

    alias_pattern()
        .replace_all(alias, |caps: &Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let Some(token) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                return whole.to_string();
            };

            if token == "m" || token == "measurement" {
                return row.name.clone();
            }
            if token == "col" {
                return column.to_string();
            }
            if let Ok(index) = token.parse::<usize>() {
                return segments
                    .get(index)
                    .map_or_else(|| whole.to_string(), |s| s.to_string());
            }
            if let Some(key) = token.strip_prefix("tag_") {
                if let Some(value) = row.tags.as_ref().and_then(|t| t.get(key)) {
                    return value.clone();
                }
            }

            whole.to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: Value) -> InfluxResponse {
        serde_json::from_value(body).unwrap()
    }

    fn query(alias: &str) -> InfluxQuery {
        InfluxQuery {
            ref_id: "A".into(),
            alias: alias.into(),
            measurement: "cpu".into(),
            ..Default::default()
        }
    }

    fn cpu_response() -> InfluxResponse {
        response(json!({
            "results": [{"series": [{
                "name": "cpu.load",
                "tags": {"host": "a1", "dc": "eu"},
                "columns": ["time", "mean", "max"],
                "values": [[1000, 1.5, 2], [2000, null, "n/a"], ["bad", 1, 1]]
            }]}]
        }))
    }

    #[test]
    fn test_default_names_and_points() {
        let result = parse_response(&query(""), &cpu_response());

        assert_eq!(result.ref_id, "A");
        assert_eq!(result.series.len(), 2);
        assert_eq!(result.series[0].name, "cpu.load.mean { dc: eu host: a1 }");
        assert_eq!(result.series[1].name, "cpu.load.max { dc: eu host: a1 }");

        // unparseable timestamps drop the point, non-numeric values become null
        assert_eq!(
            result.series[0].points,
            vec![TimePoint::new(Some(1.5), 1000.0), TimePoint::new(None, 2000.0)]
        );
        assert_eq!(result.series[1].points[1].value(), None);
    }

    #[test]
    fn test_untagged_name() {
        let body = response(json!({
            "results": [{"series": [{"name": "mem", "columns": ["time", "used"], "values": [[1, 2]]}]}]
        }));
        let result = parse_response(&query(""), &body);
        assert_eq!(result.series[0].name, "mem.used");
    }

    #[test]
    fn test_alias_tokens() {
        let names = |alias: &str| -> Vec<String> {
            parse_response(&query(alias), &cpu_response())
                .series
                .into_iter()
                .map(|s| s.name)
                .collect()
        };

        assert_eq!(names("$measurement")[0], "cpu.load");
        assert_eq!(names("$m $col"), vec!["cpu.load mean", "cpu.load max"]);
        assert_eq!(names("[[tag_host]]/$1")[0], "a1/load");
        assert_eq!(names("$tag_rack $bogus")[0], "$tag_rack $bogus");
        assert_eq!(names("$7")[0], "$7");
    }

    #[test]
    fn test_multiple_statements() {
        let body = response(json!({
            "results": [
                {"series": [{"name": "a", "columns": ["time", "v"], "values": [[1, 1]]}]},
                {"series": [{"name": "b", "columns": ["time", "v"], "values": [[1, 2]]}]}
            ]
        }));
        let result = parse_response(&query(""), &body);
        let names: Vec<&str> = result.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.v", "b.v"]);
    }
}
