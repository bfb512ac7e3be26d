mod benchmarking;
mod products;
mod sales;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

pub use benchmarking::BenchmarkingView;
pub use products::ProductView;
pub use sales::SalesView;

/// A selector value, with `All` and blanks meaning no restriction.
pub fn selected(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

/// Comma-separated multi-select values, trimmed, blanks dropped.
pub fn split_list(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// The requested window, defaulting to the last `default_days` ending today.
pub fn date_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    default_days: i64,
) -> (NaiveDate, NaiveDate) {
    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    let start = start.unwrap_or(end - Duration::days(default_days));
    (start, end)
}

pub fn check_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            Err("Start date must be before end date".to_string())
        }
        _ => Ok(()),
    }
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Leading `YYYY-MM-DD` of a date or timestamp cell.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Accepts a blank query-string value as absent.
pub fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}
