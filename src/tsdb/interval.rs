//! Interval Calculator
//!
//! Maps a requested time span to a "nice" sampling resolution so panels never
//! ask a backend for per-millisecond data over a year, or a single point over
//! a minute.
//!
//! ```text
//! span / resolution (default 30) -> floor at 1s -> first ladder step whose
//! threshold is >= the raw width
//! ```

use serde::Serialize;

use crate::tsdb::error::TsdbResult;
use crate::tsdb::types::TimeRange;

/// Target number of buckets when the caller does not override it
pub const DEFAULT_RESOLUTION: u32 = 30;

/// Smallest raw bucket width considered, in milliseconds
pub const MIN_INTERVAL_MS: i64 = 1_000;

/// `(threshold, value)` pairs in milliseconds, ascending by threshold.
/// Raw widths beyond the last threshold map to one year.
const LADDER: &[(i64, i64)] = &[
    (15, 10),
    (35, 20),
    (75, 50),
    (150, 100),
    (350, 200),
    (750, 500),
    (1_500, 1_000),
    (3_500, 2_000),
    (7_500, 5_000),
    (12_500, 10_000),
    (17_500, 15_000),
    (25_000, 20_000),
    (45_000, 30_000),
    (90_000, 60_000),
    (210_000, 120_000),
    (450_000, 300_000),
    (750_000, 600_000),
    (1_050_000, 900_000),
    (1_500_000, 1_200_000),
    (2_700_000, 1_800_000),
    (5_400_000, 3_600_000),
    (9_000_000, 7_200_000),
    (16_200_000, 10_800_000),
    (32_400_000, 21_600_000),
    (86_400_000, 43_200_000),
    (172_800_000, 86_400_000),
    (604_800_000, 86_400_000),
    (1_814_400_000, 604_800_000),
    (3_628_799_999, 2_592_000_000),
];

const ONE_YEAR_MS: i64 = 31_536_000_000;

/// A quantized sampling interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub millis: i64,
    pub text: String,
}

impl Interval {
    pub fn from_millis(millis: i64) -> Self {
        Self {
            millis,
            text: format_interval(millis),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Quantize the interval for a time range
pub fn calculate_interval(range: &TimeRange, resolution: Option<u32>) -> TsdbResult<Interval> {
    let (from, to) = range.epoch_bounds()?;
    Ok(interval_for_span(to.saturating_sub(from), resolution))
}

/// Quantize the interval for a span in milliseconds
pub fn interval_for_span(span_ms: i64, resolution: Option<u32>) -> Interval {
    let resolution = match resolution {
        Some(r) if r > 0 => r,
        _ => DEFAULT_RESOLUTION,
    };

    let raw = (span_ms / resolution as i64).max(MIN_INTERVAL_MS);
    Interval::from_millis(round_interval(raw))
}

/// Snap a raw width onto the ladder
pub fn round_interval(raw_ms: i64) -> i64 {
    LADDER
        .iter()
        .find(|(threshold, _)| raw_ms <= *threshold)
        .map(|(_, value)| *value)
        .unwrap_or(ONE_YEAR_MS)
}

/// Every value the calculator can return, ascending
pub fn ladder_values() -> Vec<i64> {
    let mut values: Vec<i64> = LADDER.iter().map(|(_, v)| *v).collect();
    values.push(ONE_YEAR_MS);
    values.dedup();
    values
}

/// Render milliseconds with the largest unit that divides them evenly
pub fn format_interval(millis: i64) -> String {
    const UNITS: &[(i64, &str)] = &[
        (604_800_000, "w"),
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
    ];

    if millis <= 0 {
        return "0ms".to_string();
    }

    // 30d and 365d read better than 4w2d / 52w1d
    if millis % 604_800_000 != 0 && millis % 86_400_000 == 0 {
        return format!("{}d", millis / 86_400_000);
    }

    for (unit_ms, suffix) in UNITS {
        if millis % unit_ms == 0 {
            return format!("{}{}", millis / unit_ms, suffix);
        }
    }

    format!("{}ms", millis)
}
