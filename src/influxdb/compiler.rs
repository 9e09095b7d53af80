//! InfluxQL statement builder
//!
//! ```text
//! SELECT <selectors> FROM ["policy".]"measurement"
//!   WHERE [(<tag filters>) AND] <time filter>
//!   [GROUP BY <parts>]
//! ```
//!
//! Raw queries skip the builder. Both forms then get `$timeFilter` and
//! `$interval` substituted.

use crate::influxdb::models::{InfluxQuery, TagFilter};
use crate::influxdb::query_part::{render_chain, QueryPart};
use crate::tsdb::time_range::to_influx_expr;
use crate::tsdb::{calculate_interval, parse_duration_ms, Interval, TimeRange, TsdbError, TsdbResult};

/// A compiled InfluxQL statement
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub text: String,
    pub interval: Interval,
    /// Query part types that were not recognised and left out
    pub warnings: Vec<String>,
}

/// Compile a panel query for the given time range
pub fn build_query(
    query: &InfluxQuery,
    range: &TimeRange,
    resolution: Option<u32>,
) -> TsdbResult<CompiledQuery> {
    let interval = effective_interval(query, range, resolution)?;
    let time_filter = render_time_filter(range)?;
    let mut warnings = Vec::new();

    let statement = if query.is_raw() {
        query.query.clone()
    } else {
        build_statement(query, &mut warnings)?
    };

    let text = statement
        .replace("$timeFilter", &time_filter)
        .replace("$interval", &interval.text);

    Ok(CompiledQuery {
        text,
        interval,
        warnings,
    })
}

fn build_statement(query: &InfluxQuery, warnings: &mut Vec<String>) -> TsdbResult<String> {
    if query.measurement.trim().is_empty() {
        return Err(TsdbError::Compile(format!(
            "query '{}' has no measurement",
            query.ref_id
        )));
    }

    let mut unknown = Vec::new();
    let mut statement = render_selectors(query, &mut unknown);
    statement.push_str(&render_measurement(query));
    statement.push_str(&render_where(&query.tags));
    statement.push_str("$timeFilter");
    statement.push_str(&render_group_by(query, &mut unknown));

    for part_type in unknown {
        tracing::info!(ref_id = %query.ref_id, part_type = %part_type, "Query part type not supported");
        warnings.push(format!("query part '{}' is not supported", part_type));
    }

    Ok(statement)
}

fn render_selectors(query: &InfluxQuery, unknown: &mut Vec<String>) -> String {
    let selectors: Vec<String> = query
        .select
        .iter()
        .map(|chain| render_chain(chain, unknown))
        .filter(|s| !s.is_empty())
        .collect();

    if selectors.is_empty() {
        return "SELECT mean(\"value\")".to_string();
    }

    format!("SELECT {}", selectors.join(", "))
}

fn render_measurement(query: &InfluxQuery) -> String {
    let policy = match query.policy.as_str() {
        "" | "default" => String::new(),
        policy => format!("\"{}\".", policy),
    };

    let measurement = if is_regex(&query.measurement) {
        query.measurement.clone()
    } else {
        format!("\"{}\"", query.measurement)
    };

    format!(" FROM {}{}", policy, measurement)
}

fn render_where(tags: &[TagFilter]) -> String {
    let conditions: Vec<String> = tags
        .iter()
        .enumerate()
        .map(|(i, tag)| render_tag(tag, i == 0))
        .collect();

    match conditions.len() {
        0 => " WHERE ".to_string(),
        1 => format!(" WHERE {} AND ", conditions[0]),
        _ => format!(" WHERE ({}) AND ", conditions.join(" ")),
    }
}

/// Render one tag condition, prefixed with its join keyword unless first
pub fn render_tag(tag: &TagFilter, first: bool) -> String {
    let prefix = if first {
        String::new()
    } else if tag.condition.is_empty() {
        "AND ".to_string()
    } else {
        format!("{} ", tag.condition)
    };

    let operator = infer_operator(tag);
    let value = match operator {
        "=~" | "!~" | "<" | ">" => tag.value.clone(),
        _ => format!("'{}'", tag.value),
    };

    format!("{}\"{}\" {} {}", prefix, tag.key, operator, value)
}

/// Operator to use for a tag filter: explicit, else regex match for `/…/` values
pub fn infer_operator(tag: &TagFilter) -> &str {
    if !tag.operator.is_empty() {
        &tag.operator
    } else if is_regex(&tag.value) {
        "=~"
    } else {
        "="
    }
}

/// `time > <from>[ AND time < <to>]`
pub fn render_time_filter(range: &TimeRange) -> TsdbResult<String> {
    let mut filter = format!("time > {}", to_influx_expr(&range.from)?);

    let to = range.to.trim();
    if !to.is_empty() && to != "now" {
        filter.push_str(&format!(" AND time < {}", to_influx_expr(to)?));
    }

    Ok(filter)
}

fn render_group_by(query: &InfluxQuery, unknown: &mut Vec<String>) -> String {
    let mut group_by = String::new();

    for def in &query.group_by {
        let Some(part) = QueryPart::parse(def) else {
            unknown.push(def.part_type.clone());
            continue;
        };

        // fill is appended with a space, never a comma
        if group_by.is_empty() {
            group_by.push_str(" GROUP BY ");
        } else if part.is_fill() {
            group_by.push(' ');
        } else {
            group_by.push_str(", ");
        }
        group_by.push_str(&part.render(""));
    }

    group_by
}

/// Calculated interval, raised to the query's minimum when one is set
fn effective_interval(
    query: &InfluxQuery,
    range: &TimeRange,
    resolution: Option<u32>,
) -> TsdbResult<Interval> {
    let calculated = calculate_interval(range, resolution)?;

    let minimum = query.interval.trim().trim_start_matches('>');
    if minimum.is_empty() {
        return Ok(calculated);
    }

    let minimum_ms = parse_duration_ms(minimum)?;
    if calculated.millis < minimum_ms {
        return Ok(Interval::from_millis(minimum_ms));
    }

    Ok(calculated)
}

fn is_regex(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('/') && value.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influxdb::models::PartDef;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn range(from: &str, to: &str) -> TimeRange {
        TimeRange::at(from, to, Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap())
    }

    fn compile(model: serde_json::Value, from: &str, to: &str) -> TsdbResult<CompiledQuery> {
        let query: InfluxQuery = serde_json::from_value(model).unwrap();
        build_query(&query, &range(from, to), None)
    }

    fn tag(key: &str, operator: &str, value: &str) -> TagFilter {
        TagFilter {
            key: key.into(),
            operator: operator.into(),
            value: value.into(),
            condition: String::new(),
        }
    }

    #[test]
    fn test_operator_inference() {
        assert_eq!(infer_operator(&tag("host", "", "/.*/")), "=~");
        assert_eq!(infer_operator(&tag("host", "", "foo")), "=");
        assert_eq!(infer_operator(&tag("host", "!=", "foo")), "!=");
    }

    #[test]
    fn test_tag_value_quoting() {
        assert_eq!(render_tag(&tag("host", "", "a1"), true), "\"host\" = 'a1'");
        assert_eq!(render_tag(&tag("host", "", "/^web/"), true), "\"host\" =~ /^web/");
        assert_eq!(render_tag(&tag("load", ">", "5"), true), "\"load\" > 5");

        let mut or = tag("host", "", "b2");
        or.condition = "OR".into();
        assert_eq!(render_tag(&or, false), "OR \"host\" = 'b2'");
        assert_eq!(render_tag(&tag("dc", "", "eu"), false), "AND \"dc\" = 'eu'");
    }

    #[test]
    fn test_structured_query() {
        let compiled = compile(
            json!({
                "refId": "A",
                "measurement": "cpu",
                "tags": [{"key": "host", "value": "a1", "operator": ""}],
                "select": [[{"type": "field", "params": ["value"]}, {"type": "mean", "params": []}]],
                "groupBy": [{"type": "time", "params": ["auto"]}]
            }),
            "1h",
            "now",
        )
        .unwrap();

        assert!(compiled.text.contains("FROM \"cpu\""));
        assert!(compiled.text.contains("\"host\" = 'a1'"));
        assert!(compiled.text.contains("time > now() - 1h"));
        assert_eq!(
            compiled.text,
            "SELECT mean(\"value\") FROM \"cpu\" WHERE \"host\" = 'a1' AND time > now() - 1h GROUP BY time(2m)"
        );
    }

    #[test]
    fn test_policy_regex_measurement_and_upper_bound() {
        let compiled = compile(
            json!({
                "measurement": "/^cpu/",
                "policy": "longterm",
                "tags": [
                    {"key": "host", "value": "a1"},
                    {"key": "host", "value": "b2", "condition": "OR"}
                ],
                "groupBy": [
                    {"type": "time", "params": ["10m"]},
                    {"type": "tag", "params": ["host"]},
                    {"type": "fill", "params": ["none"]}
                ]
            }),
            "now-6h",
            "now-1h",
        )
        .unwrap();

        assert_eq!(
            compiled.text,
            "SELECT mean(\"value\") FROM \"longterm\"./^cpu/ WHERE (\"host\" = 'a1' OR \"host\" = 'b2') AND time > now() - 6h AND time < now() - 1h GROUP BY time(10m), \"host\" fill(none)"
        );
    }

    #[test]
    fn test_default_policy_omitted() {
        let compiled = compile(json!({"measurement": "mem", "policy": "default"}), "5m", "now").unwrap();
        assert_eq!(
            compiled.text,
            "SELECT mean(\"value\") FROM \"mem\" WHERE time > now() - 5m"
        );
    }

    #[test]
    fn test_missing_measurement() {
        let err = compile(json!({"refId": "A"}), "1h", "now").unwrap_err();
        assert!(matches!(err, TsdbError::Compile(_)));
    }

    #[test]
    fn test_raw_query_macros() {
        let compiled = compile(
            json!({
                "rawQuery": true,
                "query": "SELECT max(v) FROM a WHERE $timeFilter GROUP BY time($interval); SELECT min(v) FROM b WHERE $timeFilter GROUP BY time($interval)"
            }),
            "6h",
            "now",
        )
        .unwrap();

        assert_eq!(
            compiled.text,
            "SELECT max(v) FROM a WHERE time > now() - 6h GROUP BY time(10m); SELECT min(v) FROM b WHERE time > now() - 6h GROUP BY time(10m)"
        );
    }

    #[test]
    fn test_minimum_interval() {
        let query = InfluxQuery {
            measurement: "cpu".into(),
            interval: ">5m".into(),
            group_by: vec![PartDef::new("time", &["auto"])],
            ..Default::default()
        };

        let compiled = build_query(&query, &range("1h", "now"), None).unwrap();
        assert_eq!(compiled.interval.text, "5m");
        assert!(compiled.text.ends_with("GROUP BY time(5m)"));

        // a floor below the calculated interval changes nothing
        let query = InfluxQuery {
            interval: "10s".into(),
            ..query
        };
        let compiled = build_query(&query, &range("1h", "now"), None).unwrap();
        assert_eq!(compiled.interval.text, "2m");
    }

    #[test]
    fn test_unknown_parts_warn() {
        let compiled = compile(
            json!({
                "measurement": "cpu",
                "select": [[{"type": "field", "params": ["value"]}, {"type": "wizardry", "params": []}]]
            }),
            "1h",
            "now",
        )
        .unwrap();

        assert!(compiled.text.starts_with("SELECT \"value\" FROM"));
        assert_eq!(compiled.warnings.len(), 1);
    }

    #[test]
    fn test_absolute_bounds() {
        let filter = render_time_filter(&range("1483225200000", "1483228800000")).unwrap();
        assert_eq!(filter, "time > 1483225200000ms AND time < 1483228800000ms");
    }
}
