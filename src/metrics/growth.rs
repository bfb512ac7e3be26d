use chrono::{Duration, NaiveDate};
use serde::{Serialize, Serializer};

/// Period-over-period change. A zero or missing prior period has no defined
/// growth and is reported as `"N/A"` rather than infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    Percent(f64),
    NotApplicable,
}

impl Growth {
    pub fn percent(self) -> Option<f64> {
        match self {
            Self::Percent(value) => Some(value),
            Self::NotApplicable => None,
        }
    }
}

impl Serialize for Growth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Percent(value) => serializer.serialize_f64(round2(*value)),
            Self::NotApplicable => serializer.serialize_str("N/A"),
        }
    }
}

pub fn growth_pct(current: f64, prior: f64) -> Growth {
    if prior == 0.0 || !prior.is_finite() || !current.is_finite() {
        return Growth::NotApplicable;
    }
    let pct = (current - prior) / prior * 100.0;
    if pct.is_finite() {
        Growth::Percent(pct)
    } else {
        Growth::NotApplicable
    }
}

pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

pub fn share_pct(part: f64, total: f64) -> f64 {
    ratio_or_zero(part, total) * 100.0
}

/// The window of equal length that ends where `[start, end]` begins.
pub fn comparison_window(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days = (end - start).num_days().max(0);
    (start - Duration::days(days), start)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_day_windows_grow_twenty_percent() {
        assert_eq!(growth_pct(1_200.0, 1_000.0), Growth::Percent(20.0));
    }

    #[test]
    fn zero_prior_is_not_applicable() {
        for current in [0.0, 1.0, -5.0, 1e9] {
            assert_eq!(growth_pct(current, 0.0), Growth::NotApplicable);
        }
        assert_eq!(growth_pct(f64::NAN, 10.0), Growth::NotApplicable);
    }

    #[test]
    fn growth_serialises_as_number_or_marker() {
        let rendered = serde_json::to_string(&[
            Growth::Percent(12.3456),
            Growth::NotApplicable,
        ])
        .expect("serialise");
        assert_eq!(rendered, r#"[12.35,"N/A"]"#);
    }

    #[test]
    fn ratios_never_divide_by_zero() {
        assert_eq!(ratio_or_zero(10.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(10.0, 4.0), 2.5);
        assert_eq!(share_pct(1.0, 4.0), 25.0);
    }

    #[test]
    fn comparison_window_precedes_selection() {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).expect("date");
        let end = NaiveDate::from_ymd_opt(2024, 4, 8).expect("date");
        let (prev_start, prev_end) = comparison_window(start, end);
        assert_eq!(prev_start, NaiveDate::from_ymd_opt(2024, 3, 25).expect("date"));
        assert_eq!(prev_end, start);
    }
}
