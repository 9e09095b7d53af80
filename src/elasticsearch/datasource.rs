//! Elasticsearch data source settings and index patterns

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};

use crate::tsdb::{DataSourceInfo, TsdbError, TsdbResult};

/// Settings read from an Elasticsearch data source
#[derive(Debug, Clone)]
pub struct ElasticDatasource {
    pub info: DataSourceInfo,
    /// Version code as stored by the dashboard (2, 5, 56, 60, 70, ...)
    pub es_version: i64,
    pub time_field: String,
    /// Index rotation; `None` when the index name is used verbatim
    pub interval: Option<IndexInterval>,
    pub index: String,
}

impl ElasticDatasource {
    /// Read settings, failing when required ones are missing
    pub fn from_info(info: &DataSourceInfo) -> TsdbResult<Self> {
        let es_version = info
            .setting_i64("esVersion")
            .ok_or_else(|| TsdbError::Config("Elasticsearch requires esVersion".to_string()))?;

        let time_field = info
            .setting_str("timeField")
            .ok_or_else(|| TsdbError::Config("Elasticsearch requires timeField".to_string()))?
            .to_string();

        let interval = match info.setting_str("interval") {
            Some(name) => Some(IndexInterval::parse(name).ok_or_else(|| {
                TsdbError::Config(format!("Unknown index interval '{}'", name))
            })?),
            None => None,
        };

        if info.database.is_empty() {
            return Err(TsdbError::Config(
                "Elasticsearch requires an index name".to_string(),
            ));
        }

        Ok(Self {
            info: info.clone(),
            es_version,
            time_field,
            interval,
            index: info.database.clone(),
        })
    }

    /// Index names covering `[start, end)`.
    ///
    /// Steps at the coarser of the rotation interval and the finest date
    /// part the pattern renders, so a daily pattern is never walked hourly.
    /// A list that would not fit in [`MAX_INDEX_PATH_BYTES`] collapses to a
    /// single wildcard.
    pub fn indices(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
        let Some(pattern) = IndexPattern::parse(&self.index) else {
            return vec![self.index.clone()];
        };

        let step = self
            .interval
            .unwrap_or(IndexInterval::Daily)
            .max(pattern.granularity());

        let mut seen = HashSet::new();
        let mut result: Vec<String> = Vec::new();
        let mut path_len = 0;
        let mut current = step.start_of(start);

        loop {
            let name = pattern.render(current);
            if seen.insert(name.clone()) {
                path_len += name.len() + 1;
                if path_len > MAX_INDEX_PATH_BYTES {
                    let first = result.first().unwrap_or(&name);
                    let last = pattern.render(step.start_of(end));
                    return vec![pattern.wildcard(first, &last)];
                }
                result.push(name);
            }

            current = match step.next(current) {
                Some(next) if next < end => next,
                _ => break,
            };
        }

        result
    }
}

/// Longest comma-joined index list sent in a request path; Elasticsearch
/// rejects request lines over 4 KB by default
pub const MAX_INDEX_PATH_BYTES: usize = 2048;

/// How often a rotated index rolls over, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexInterval {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl IndexInterval {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Hourly" => Some(Self::Hourly),
            "Daily" => Some(Self::Daily),
            "Weekly" => Some(Self::Weekly),
            "Monthly" => Some(Self::Monthly),
            "Yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Truncate to the start of the containing period (weeks start Monday)
    fn start_of(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let day = Utc
            .with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0)
            .single()
            .unwrap_or(t);

        match self {
            Self::Hourly => day + Duration::hours(t.hour() as i64),
            Self::Daily => day,
            Self::Weekly => day - Duration::days(t.weekday().num_days_from_monday() as i64),
            Self::Monthly => Utc
                .with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(day),
            Self::Yearly => Utc
                .with_ymd_and_hms(t.year(), 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(day),
        }
    }

    fn next(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Hourly => t.checked_add_signed(Duration::hours(1)),
            Self::Daily => t.checked_add_signed(Duration::days(1)),
            Self::Weekly => t.checked_add_signed(Duration::weeks(1)),
            Self::Monthly => t.checked_add_months(Months::new(1)),
            Self::Yearly => t.checked_add_months(Months::new(12)),
        }
    }
}

/// `[prefix]DATEFORMAT`, e.g. `[metrics-]YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq)]
struct IndexPattern {
    prefix: String,
    date_format: String,
}

impl IndexPattern {
    fn parse(index: &str) -> Option<Self> {
        let rest = index.strip_prefix('[')?;
        let (prefix, date_format) = rest.split_once(']')?;
        if date_format.is_empty() {
            return None;
        }

        Some(Self {
            prefix: prefix.to_string(),
            date_format: date_format.to_string(),
        })
    }

    /// Finest period the date format distinguishes
    fn granularity(&self) -> IndexInterval {
        if self.date_format.contains("HH") {
            IndexInterval::Hourly
        } else if self.date_format.contains("DD") {
            IndexInterval::Daily
        } else if self.date_format.contains("MM") {
            IndexInterval::Monthly
        } else {
            IndexInterval::Yearly
        }
    }

    /// One wildcard covering every name from `first` to `last`.
    ///
    /// Whole leading date parts shared by both ends are kept when the format
    /// leads with the year; otherwise only the literal prefix survives.
    fn wildcard(&self, first: &str, last: &str) -> String {
        let mut keep = self.prefix.len();

        if self.date_format.starts_with("YYYY") {
            let common = first
                .char_indices()
                .zip(last.chars())
                .take_while(|((_, a), b)| a == b)
                .last()
                .map_or(0, |((i, c), _)| i + c.len_utf8());
            if let Some(dot) = first[..common].rfind('.') {
                keep = keep.max(dot + 1);
            }
        }

        format!("{}*", &first[..keep])
    }

    /// Date parts are written without zero padding and joined with dots:
    /// `YYYY-MM-DD` on 2016-10-07 gives `2016.10.7`
    fn render(&self, t: DateTime<Utc>) -> String {
        let date = self
            .date_format
            .replace("YYYY", &t.year().to_string())
            .replace("MM", &t.month().to_string())
            .replace("DD", &t.day().to_string())
            .replace("HH", &t.hour().to_string())
            .replace('-', ".");

        format!("{}{}", self.prefix, date)
    }
}
