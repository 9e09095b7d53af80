//! Time Range Formatter
//!
//! Turns the relative bound expressions a dashboard sends (`now`, `now-6h`,
//! `6h`, or an absolute epoch in milliseconds) into either epoch milliseconds
//! or an InfluxQL time expression.
//!
//! # Supported Syntax
//!
//! ```text
//! now              -> now() / wall clock minus NOW_OFFSET_MS
//! now-1h           -> now() - 1h
//! 7d               -> now() - 7d
//! 1h30m            -> now() - 1h30m
//! 1476000000000    -> absolute epoch milliseconds
//! ```

use chrono::{DateTime, Utc};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{all_consuming, map_opt, map_res, value},
    multi::fold_many1,
    sequence::pair,
    IResult,
};

use crate::tsdb::error::{TsdbError, TsdbResult};

/// Offset applied when a bound is exactly `now`.
///
/// The most recent bucket is usually incomplete, which makes neighbouring
/// derivative aggregations report spikes. Resolving `now` half a minute in
/// the past keeps that bucket out of the range.
pub const NOW_OFFSET_MS: i64 = 30_000;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
const YEAR_MS: i64 = 365 * DAY_MS;

/// A parsed time range bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeExpr {
    /// The literal `now`
    Now,
    /// A duration before now, keeping the duration text as written
    Ago { millis: i64, text: String },
    /// Absolute epoch milliseconds
    Absolute(i64),
}

/// Parse a bound expression
pub fn parse_time_expr(input: &str) -> TsdbResult<TimeExpr> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    if compact.is_empty() {
        return Err(TsdbError::Compile("empty time expression".to_string()));
    }

    if compact == "now" {
        return Ok(TimeExpr::Now);
    }

    if compact.bytes().all(|b| b.is_ascii_digit()) {
        let ms = compact
            .parse::<i64>()
            .map_err(|e| TsdbError::Compile(format!("invalid epoch '{}': {}", input, e)))?;
        return Ok(TimeExpr::Absolute(ms));
    }

    let text = compact.strip_prefix("now-").unwrap_or(&compact);
    let millis = parse_duration_ms(text)?;

    Ok(TimeExpr::Ago {
        millis,
        text: text.to_string(),
    })
}

/// Parse a duration like "30s", "7d" or "1h30m" into milliseconds
pub fn parse_duration_ms(input: &str) -> TsdbResult<i64> {
    match all_consuming(parse_duration)(input.trim()) {
        Ok((_, ms)) => Ok(ms),
        Err(_) => Err(TsdbError::Compile(format!(
            "invalid duration '{}'",
            input
        ))),
    }
}

/// Resolve a bound to epoch milliseconds relative to `now`
pub fn to_epoch_ms(input: &str, now: DateTime<Utc>) -> TsdbResult<i64> {
    let now_ms = now.timestamp_millis();

    Ok(match parse_time_expr(input)? {
        TimeExpr::Now => now_ms - NOW_OFFSET_MS,
        TimeExpr::Ago { millis, .. } => now_ms - millis,
        TimeExpr::Absolute(ms) => ms,
    })
}

/// Render a bound as an InfluxQL time expression
pub fn to_influx_expr(input: &str) -> TsdbResult<String> {
    Ok(match parse_time_expr(input)? {
        TimeExpr::Now => "now()".to_string(),
        TimeExpr::Ago { text, .. } => format!("now() - {}", text),
        TimeExpr::Absolute(ms) => format!("{}ms", ms),
    })
}

/// Parse one or more `<int><unit>` groups and sum them
fn parse_duration(input: &str) -> IResult<&str, i64> {
    fold_many1(parse_duration_group, || 0i64, |acc, ms| acc.saturating_add(ms))(input)
}

/// Parse a single group like "30m"
fn parse_duration_group(input: &str) -> IResult<&str, i64> {
    map_opt(
        pair(map_res(digit1, |s: &str| s.parse::<i64>()), parse_unit),
        |(num, unit)| num.checked_mul(unit),
    )(input)
}

fn parse_unit(input: &str) -> IResult<&str, i64> {
    alt((
        value(1i64, tag("ms")),
        value(SECOND_MS, tag("s")),
        value(MINUTE_MS, tag("m")),
        value(HOUR_MS, tag("h")),
        value(DAY_MS, tag("d")),
        value(WEEK_MS, tag("w")),
        value(YEAR_MS, tag("y")),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 10, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse_duration_ms("10ms").unwrap(), 10);
        assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_duration_ms("5m").unwrap(), 300_000);
        assert_eq!(parse_duration_ms("1h30m").unwrap(), 5_400_000);
        assert_eq!(parse_duration_ms("7d").unwrap(), 7 * DAY_MS);
        assert_eq!(parse_duration_ms("2w").unwrap(), 14 * DAY_MS);
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("h").is_err());
        assert!(parse_duration_ms("5x").is_err());
        assert!(parse_duration_ms("5m trailing").is_err());
    }

    #[test]
    fn test_parse_time_expr() {
        assert_eq!(parse_time_expr("now").unwrap(), TimeExpr::Now);
        assert_eq!(
            parse_time_expr("now-1h").unwrap(),
            TimeExpr::Ago {
                millis: HOUR_MS,
                text: "1h".to_string()
            }
        );
        assert_eq!(
            parse_time_expr("6h").unwrap(),
            TimeExpr::Ago {
                millis: 6 * HOUR_MS,
                text: "6h".to_string()
            }
        );
        assert_eq!(
            parse_time_expr("1475841600000").unwrap(),
            TimeExpr::Absolute(1_475_841_600_000)
        );
    }

    #[test]
    fn test_now_is_offset() {
        let now = fixed_now();
        let ms = to_epoch_ms("now", now).unwrap();
        assert_eq!(ms, now.timestamp_millis() - NOW_OFFSET_MS);
    }

    #[test]
    fn test_relative_to_epoch() {
        let now = fixed_now();
        assert_eq!(
            to_epoch_ms("now-1h", now).unwrap(),
            now.timestamp_millis() - HOUR_MS
        );
        assert_eq!(
            to_epoch_ms("1h", now).unwrap(),
            now.timestamp_millis() - HOUR_MS
        );
        assert_eq!(to_epoch_ms("1000", now).unwrap(), 1000);
    }

    #[test]
    fn test_influx_expr() {
        assert_eq!(to_influx_expr("now").unwrap(), "now()");
        assert_eq!(to_influx_expr("now-5m").unwrap(), "now() - 5m");
        assert_eq!(to_influx_expr("1h").unwrap(), "now() - 1h");
        assert_eq!(to_influx_expr("1000").unwrap(), "1000ms");
        assert!(to_influx_expr("yesterday").is_err());
    }
}
