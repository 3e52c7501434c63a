//! Field parsers for the raw register and price-paid extracts.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Compiles the WKT point pattern used by the brownfield register.
///
/// The pattern is unanchored, so surrounding text is tolerated.
#[must_use]
pub fn point_regex() -> Regex {
    Regex::new(r"POINT\(([-\d\.]+) ([-\d\.]+)\)").unwrap_or_else(|_| unreachable!())
}

/// Extracts `(longitude, latitude)` from a WKT `POINT(x y)` string.
///
/// Returns `None` if the pattern does not match or either capture is not a
/// number.
#[must_use]
pub fn parse_point(re: &Regex, s: &str) -> Option<(f64, f64)> {
    let caps = re.captures(s)?;
    let longitude = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let latitude = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some((longitude, latitude))
}

/// Parses a planning permission date.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `DD/MM/YYYY` and ISO 8601 datetimes.
#[must_use]
pub fn parse_permission_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    parse_datetime(s, &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"])
}

/// Parses a price-paid transfer date such as `2015-06-19 00:00`.
#[must_use]
pub fn parse_transfer_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    parse_datetime(s, &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"])
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_datetime(s: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|dt| dt.date())
}

/// Parses an optional numeric cell. Empty or non-numeric cells are `None`.
#[must_use]
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
