//! Elasticsearch query descriptor
//!
//! The dashboard sends bucket and metric aggregations as loosely typed JSON
//! (`{id, type, field, settings}`). They are parsed once into tagged enums so
//! the compiler and the response parser can match exhaustively on the kind.

use serde::Deserialize;
use serde_json::Value;

/// Default `terms` size when the panel does not set one
pub const DEFAULT_TERMS_SIZE: i64 = 20;

/// A panel query against an Elasticsearch data source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsQuery {
    #[serde(default)]
    pub ref_id: String,
    #[serde(default)]
    pub alias: String,
    /// Overrides the data source's time field when set
    #[serde(default)]
    pub time_field: String,
    /// Lucene query string
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub metrics: Vec<MetricAgg>,
    #[serde(default)]
    pub bucket_aggs: Vec<BucketAgg>,
}

impl EsQuery {
    /// Prefix for every series name: the alias, else the ref id
    pub fn series_prefix(&self) -> &str {
        if self.alias.is_empty() {
            &self.ref_id
        } else {
            &self.alias
        }
    }
}

/// A bucket aggregation, in dashboard order
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawAgg")]
pub struct BucketAgg {
    pub id: String,
    pub field: String,
    pub kind: BucketKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BucketKind {
    DateHistogram(DateHistogramSettings),
    Terms(TermsSettings),
    /// Any type this layer does not compile; kept so bucket indexes line up
    Unsupported(String),
}

impl BucketKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::DateHistogram(_) => "date_histogram",
            Self::Terms(_) => "terms",
            Self::Unsupported(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateHistogramSettings {
    /// Fixed interval; `None` means quantize from the time range
    pub interval: Option<String>,
    pub min_doc_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermsSettings {
    pub size: i64,
    pub order: Option<String>,
    pub order_by: Option<String>,
    pub min_doc_count: Option<i64>,
}

impl Default for TermsSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_TERMS_SIZE,
            order: None,
            order_by: None,
            min_doc_count: None,
        }
    }
}

/// A metric aggregation, in dashboard order
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawAgg")]
pub struct MetricAgg {
    pub id: String,
    pub field: String,
    /// Hidden metrics are compiled (others may reference them) but not emitted
    pub hide: bool,
    pub script: Option<String>,
    pub kind: MetricKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    /// Read from each bucket's `doc_count`; compiles to nothing
    Count,
    Avg,
    Sum,
    Min,
    Max,
    Cardinality { precision_threshold: Option<i64> },
    Percentiles { percents: Vec<f64> },
    ExtendedStats { sigma: Option<f64> },
    Derivative { buckets_path: String },
    MovingAvg {
        buckets_path: String,
        window: Option<i64>,
        model: Option<String>,
    },
    Unsupported(String),
}

impl MetricKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Cardinality { .. } => "cardinality",
            Self::Percentiles { .. } => "percentiles",
            Self::ExtendedStats { .. } => "extended_stats",
            Self::Derivative { .. } => "derivative",
            Self::MovingAvg { .. } => "moving_avg",
            Self::Unsupported(name) => name,
        }
    }

    /// Multi-value metrics have no single `value` to read back
    pub fn is_multi_value(&self) -> bool {
        matches!(self, Self::Percentiles { .. } | Self::ExtendedStats { .. })
    }
}

/// Wire shape shared by bucket and metric aggregations
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAgg {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(rename = "type", default)]
    agg_type: String,
    #[serde(default)]
    field: String,
    #[serde(default)]
    hide: bool,
    #[serde(default)]
    settings: Value,
    #[serde(default)]
    inline_script: String,
    #[serde(default)]
    pipeline_agg: String,
}

impl From<RawAgg> for BucketAgg {
    fn from(raw: RawAgg) -> Self {
        let s = &raw.settings;
        let kind = match raw.agg_type.as_str() {
            "date_histogram" => BucketKind::DateHistogram(DateHistogramSettings {
                interval: setting_str(s, "interval").filter(|i| i != "auto"),
                min_doc_count: setting_i64(s, "min_doc_count").unwrap_or(0),
            }),
            "terms" => BucketKind::Terms(TermsSettings {
                size: setting_i64(s, "size")
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_TERMS_SIZE),
                order: setting_str(s, "order"),
                order_by: setting_str(s, "orderBy"),
                min_doc_count: setting_i64(s, "min_doc_count"),
            }),
            other => BucketKind::Unsupported(other.to_string()),
        };

        BucketAgg {
            id: raw.id,
            field: raw.field,
            kind,
        }
    }
}

impl From<RawAgg> for MetricAgg {
    fn from(raw: RawAgg) -> Self {
        let s = &raw.settings;

        // Pipeline aggregations point at another metric by id
        let buckets_path = if !raw.pipeline_agg.is_empty() {
            raw.pipeline_agg.clone()
        } else if !raw.field.is_empty() {
            raw.field.clone()
        } else {
            "_count".to_string()
        };

        let kind = match raw.agg_type.as_str() {
            "count" => MetricKind::Count,
            "avg" => MetricKind::Avg,
            "sum" => MetricKind::Sum,
            "min" => MetricKind::Min,
            "max" => MetricKind::Max,
            "cardinality" => MetricKind::Cardinality {
                precision_threshold: setting_i64(s, "precision_threshold"),
            },
            "percentiles" => MetricKind::Percentiles {
                percents: s
                    .get("percents")
                    .and_then(|v| v.as_array())
                    .map(|items| items.iter().filter_map(value_f64).collect())
                    .unwrap_or_default(),
            },
            "extended_stats" => MetricKind::ExtendedStats {
                sigma: s.get("sigma").and_then(value_f64),
            },
            "derivative" => MetricKind::Derivative { buckets_path },
            "moving_avg" => MetricKind::MovingAvg {
                buckets_path,
                window: setting_i64(s, "window"),
                model: setting_str(s, "model"),
            },
            other => MetricKind::Unsupported(other.to_string()),
        };

        let script = if !raw.inline_script.is_empty() {
            Some(raw.inline_script)
        } else {
            s.get("script")
                .and_then(|v| v.get("inline").or(Some(v)))
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        MetricAgg {
            id: raw.id,
            field: raw.field,
            hide: raw.hide,
            script,
            kind,
        }
    }
}

/// Panels send ids as either "1" or 1
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn setting_str(settings: &Value, key: &str) -> Option<String> {
    match settings.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Settings arrive as numbers or numeric strings
fn setting_i64(settings: &Value, key: &str) -> Option<i64> {
    match settings.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
