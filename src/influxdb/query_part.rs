//! InfluxQL query parts
//!
//! Select and group-by clauses arrive as chains of `{type, params}` parts.
//! Each part wraps the expression rendered by the parts before it:
//!
//! ```text
//! [field(value), mean(), math(/ 100), alias(load)]
//!   "value" → mean("value") → mean("value") / 100 → mean("value") / 100 AS "load"
//! ```

use crate::influxdb::models::PartDef;

/// Aggregation, selector and transformation functions the editor can emit
pub const FUNCTIONS: &[&str] = &[
    "count",
    "distinct",
    "integral",
    "mean",
    "median",
    "mode",
    "sum",
    "stddev",
    "spread",
    "first",
    "last",
    "max",
    "min",
    "percentile",
    "top",
    "bottom",
    "derivative",
    "non_negative_derivative",
    "difference",
    "moving_average",
    "cumulative_sum",
    "elapsed",
    "holt_winters",
];

/// A recognised query part
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPart {
    /// `"field"` or `*`
    Field(String),
    /// Group by a tag key
    Tag(String),
    Alias(String),
    /// Arithmetic suffix such as `/ 100`
    Math(String),
    /// Group by time; `auto` defers to the calculated interval
    Time(String),
    Fill(String),
    Function { name: String, params: Vec<String> },
}

impl QueryPart {
    /// Recognise a part definition; `None` for unknown types
    pub fn parse(def: &PartDef) -> Option<Self> {
        let first = || def.params.first().cloned().unwrap_or_default();

        Some(match def.part_type.as_str() {
            "field" => Self::Field(first()),
            "tag" => Self::Tag(first()),
            "alias" => Self::Alias(first()),
            "math" => Self::Math(first()),
            "time" => Self::Time(
                def.params
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "auto".to_string()),
            ),
            "fill" => Self::Fill(first()),
            name if FUNCTIONS.contains(&name) => Self::Function {
                name: name.to_string(),
                params: def.params.clone(),
            },
            _ => return None,
        })
    }

    /// Render this part around the expression built so far
    pub fn render(&self, inner: &str) -> String {
        match self {
            Self::Field(name) if name == "*" => "*".to_string(),
            Self::Field(name) | Self::Tag(name) => format!("\"{}\"", name),
            Self::Alias(alias) => format!("{} AS \"{}\"", inner, alias),
            Self::Math(expr) => format!("{} {}", inner, expr),
            Self::Time(interval) if interval == "auto" => "time($interval)".to_string(),
            Self::Time(interval) => format!("time({})", interval),
            Self::Fill(value) => format!("fill({})", value),
            Self::Function { name, params } => {
                let args: Vec<&str> = std::iter::once(inner)
                    .filter(|i| !i.is_empty())
                    .chain(params.iter().map(String::as_str))
                    .collect();
                format!("{}({})", name, args.join(", "))
            }
        }
    }

    pub fn is_fill(&self) -> bool {
        matches!(self, Self::Fill(_))
    }
}

/// Render a chain of parts, collecting the types that were not recognised
pub fn render_chain(defs: &[PartDef], unknown: &mut Vec<String>) -> String {
    defs.iter().fold(String::new(), |inner, def| match QueryPart::parse(def) {
        Some(part) => part.render(&inner),
        None => {
            unknown.push(def.part_type.clone());
            inner
        }
    })
}
