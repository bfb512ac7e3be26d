use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Trailing mean over `window` points. Leading points without a full window,
/// and windows holding a non-finite value, stay `None`.
pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 || values.len() < window {
        return vec![None; values.len()];
    }

    let mut out = vec![None; window - 1];
    out.extend(values.windows(window).map(|points| {
        points
            .iter()
            .all(|value| value.is_finite())
            .then(|| points.iter().sum::<f64>() / window as f64)
    }));
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayTotal {
    pub day: &'static str,
    pub total: f64,
    pub count: u64,
}

const WEEK: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Sums values per day of week, Monday first. Every day is present.
pub fn weekday_totals<I>(points: I) -> Vec<WeekdayTotal>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut totals: Vec<WeekdayTotal> = WEEK
        .into_iter()
        .map(|day| WeekdayTotal {
            day,
            total: 0.0,
            count: 0,
        })
        .collect();

    for (date, value) in points {
        let slot = &mut totals[date.weekday().num_days_from_monday() as usize];
        slot.total += value;
        slot.count += 1;
    }
    totals
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Sample standard deviation; needs at least two observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let avg = finite.iter().sum::<f64>() / finite.len() as f64;
    let variance = finite.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (finite.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_leaves_leading_points_null() {
        let values: Vec<f64> = (1..=9).map(f64::from).collect();
        let averaged = moving_average(&values, 7);
        assert!(averaged[..6].iter().all(Option::is_none));
        assert_eq!(averaged[6], Some(4.0));
        assert_eq!(averaged[7], Some(5.0));
        assert_eq!(averaged[8], Some(6.0));
    }

    #[test]
    fn moving_average_matches_window_mean_everywhere() {
        let values = [3.5, 0.0, 12.25, 7.0, 7.0, 1.5, 9.0, 4.0, 30.0, 2.0];
        let window = 3;
        for (idx, got) in moving_average(&values, window).iter().enumerate() {
            if idx + 1 < window {
                assert_eq!(*got, None);
            } else {
                let slice = &values[idx + 1 - window..=idx];
                let expected = slice.iter().sum::<f64>() / window as f64;
                assert!((got.expect("defined") - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn non_finite_points_only_blank_their_own_windows() {
        let values = [1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0, f64::INFINITY, 8.0];
        let averages = moving_average(&values, 2);
        assert_eq!(
            averages,
            vec![None, Some(1.5), None, None, Some(4.5), Some(5.5), None, None]
        );
    }

    #[test]
    fn short_or_empty_series() {
        assert!(moving_average(&[], 7).is_empty());
        assert_eq!(moving_average(&[1.0, 2.0], 7), vec![None, None]);
        assert_eq!(moving_average(&[1.0], 0), vec![None]);
    }

    #[test]
    fn weekdays_start_on_monday() {
        // 2024-01-01 was a Monday.
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).expect("date");
        let totals = weekday_totals([(sunday, 5.0), (monday, 2.0), (monday, 3.0)]);
        assert_eq!(totals.len(), 7);
        assert_eq!(totals[0].day, "Monday");
        assert_eq!(totals[0].total, 5.0);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals[6].day, "Sunday");
        assert_eq!(totals[6].total, 5.0);
        assert_eq!(totals[3].total, 0.0);
    }

    #[test]
    fn summary_statistics() {
        assert_eq!(median(&[100.0, 100.0, 10.0, 10.0]), Some(55.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(std_dev(&[5.0]), None);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).expect("std") - 2.138).abs() < 1e-3);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.0), Some(1.0));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 1.0), Some(4.0));
    }
}
