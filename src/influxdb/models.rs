//! InfluxDB query descriptor and response shapes

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// A panel query against an InfluxDB data source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluxQuery {
    #[serde(default)]
    pub ref_id: String,
    /// Series name template, e.g. `$m.$col [[tag_host]]`
    #[serde(default)]
    pub alias: String,
    /// Retention policy; empty or `default` means none
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub measurement: String,
    /// Use `query` verbatim instead of the structured parts
    #[serde(default)]
    pub raw_query: bool,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub tags: Vec<TagFilter>,
    #[serde(default)]
    pub group_by: Vec<PartDef>,
    #[serde(default)]
    pub select: Vec<Vec<PartDef>>,
    /// Lower bound on the group-by interval, e.g. `10s` or `>10s`
    #[serde(default)]
    pub interval: String,
}

impl InfluxQuery {
    pub fn is_raw(&self) -> bool {
        self.raw_query && !self.query.trim().is_empty()
    }
}

/// One `WHERE` condition
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TagFilter {
    #[serde(default)]
    pub key: String,
    /// Inferred from the value when empty
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: String,
    /// Joins this filter to the previous one; `AND` when empty
    #[serde(default)]
    pub condition: String,
}

/// A query part as sent by the editor: `{type, params}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartDef {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default, deserialize_with = "stringified_params")]
    pub params: Vec<String>,
}

impl PartDef {
    pub fn new(part_type: &str, params: &[&str]) -> Self {
        Self {
            part_type: part_type.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Params arrive as strings or numbers; both render the same in InfluxQL
fn stringified_params<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

/// Body of `GET /query`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfluxResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub series: Vec<Row>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One series in a statement result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl InfluxResponse {
    /// First error reported by the server, at either level
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_model() {
        let query: InfluxQuery = serde_json::from_value(json!({
            "refId": "A",
            "measurement": "cpu",
            "policy": "default",
            "tags": [{"key": "host", "value": "a1"}],
            "groupBy": [{"type": "time", "params": ["auto"]}, {"type": "fill", "params": ["null"]}],
            "select": [[{"type": "field", "params": ["usage"]}, {"type": "percentile", "params": [95]}]]
        }))
        .unwrap();

        assert_eq!(query.tags[0].operator, "");
        assert_eq!(query.group_by[1], PartDef::new("fill", &["null"]));
        assert_eq!(query.select[0][1].params, vec!["95"]);
        assert!(!query.is_raw());
    }

    #[test]
    fn test_raw_needs_text() {
        let mut query = InfluxQuery {
            raw_query: true,
            ..Default::default()
        };
        assert!(!query.is_raw());

        query.query = "SELECT 1".into();
        assert!(query.is_raw());
    }

    #[test]
    fn test_response_error() {
        let ok: InfluxResponse = serde_json::from_value(json!({
            "results": [{"series": [{"name": "cpu", "columns": ["time", "value"], "values": [[1, 2]]}]}]
        }))
        .unwrap();
        assert_eq!(ok.error(), None);
        assert_eq!(ok.results[0].series[0].name, "cpu");

        let failed: InfluxResponse = serde_json::from_value(json!({
            "results": [{"error": "database not found: nope"}]
        }))
        .unwrap();
        assert_eq!(failed.error(), Some("database not found: nope"));
    }
}
