use serde::{Deserialize, Serialize};

use super::{
    growth::{ratio_or_zero, share_pct},
    series::{mean, quantile},
};

const CLV_HORIZON_DAYS: f64 = 365.0;

/// Per-customer aggregates over the analysis window.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomerActivity {
    pub customer_id: String,
    pub recency_days: i64,
    pub frequency: u64,
    pub monetary: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RfmProfile {
    pub customer_id: String,
    pub recency_days: i64,
    pub frequency: u64,
    pub monetary: f64,
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    pub rfm_code: String,
    pub rfm_segment: &'static str,
    pub clv: f64,
}

// 1 below the first tertile, 3 above the second.
fn tertile_scores(values: &[f64]) -> Vec<u8> {
    let (Some(low), Some(high)) = (quantile(values, 1.0 / 3.0), quantile(values, 2.0 / 3.0)) else {
        return vec![1; values.len()];
    };
    values
        .iter()
        .map(|value| {
            if *value <= low {
                1
            } else if *value <= high {
                2
            } else {
                3
            }
        })
        .collect()
}

fn rfm_segment(recency: u8, frequency: u8, monetary: u8) -> &'static str {
    match (recency, frequency, monetary) {
        (3, 3, 3) => "Champions",
        (r, f, _) if r >= 2 && f >= 2 => "Loyal Customers",
        (3, 1, _) => "New Customers",
        (1, f, _) if f >= 2 => "At Risk",
        (1, 1, _) => "Hibernating",
        _ => "Potential Loyalists",
    }
}

/// Average order value times purchase rate over the window, projected to a year.
pub fn clv_estimate(monetary: f64, frequency: u64, span_days: i64) -> f64 {
    if frequency == 0 {
        return 0.0;
    }
    let average_order = ratio_or_zero(monetary, frequency as f64);
    let purchase_rate = ratio_or_zero(frequency as f64, span_days.max(1) as f64);
    average_order * purchase_rate * CLV_HORIZON_DAYS
}

/// Scores recency, frequency and monetary value into tertiles. Recency is
/// inverted so the most recent buyers score 3.
pub fn score_customers(customers: &[CustomerActivity], span_days: i64) -> Vec<RfmProfile> {
    let recency: Vec<f64> = customers.iter().map(|c| c.recency_days as f64).collect();
    let frequency: Vec<f64> = customers.iter().map(|c| c.frequency as f64).collect();
    let monetary: Vec<f64> = customers.iter().map(|c| c.monetary).collect();

    let recency_scores = tertile_scores(&recency);
    let frequency_scores = tertile_scores(&frequency);
    let monetary_scores = tertile_scores(&monetary);

    customers
        .iter()
        .enumerate()
        .map(|(idx, customer)| {
            let r = 4 - recency_scores[idx];
            let f = frequency_scores[idx];
            let m = monetary_scores[idx];
            RfmProfile {
                customer_id: customer.customer_id.clone(),
                recency_days: customer.recency_days,
                frequency: customer.frequency,
                monetary: customer.monetary,
                recency_score: r,
                frequency_score: f,
                monetary_score: m,
                rfm_code: format!("R{r}F{f}M{m}"),
                rfm_segment: rfm_segment(r, f, m),
                clv: clv_estimate(customer.monetary, customer.frequency, span_days),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClvSummary {
    pub customers: usize,
    pub average_value: f64,
    pub top_decile_value: f64,
    pub top_decile_share_pct: f64,
    pub total_value: f64,
}

impl ClvSummary {
    pub fn message(&self) -> String {
        format!(
            "Average CLV: ${:.2} | Top 10% contribute: ${:.2} ({:.1}% of total revenue) | Total Customer Value: ${:.2}",
            self.average_value, self.top_decile_value, self.top_decile_share_pct, self.total_value
        )
    }
}

/// Spending summary; the top decile is the largest `floor(n / 10)` customers.
pub fn clv_summary(spending: &[f64]) -> Option<ClvSummary> {
    let average_value = mean(spending)?;
    let mut sorted: Vec<f64> = spending.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let total_value: f64 = sorted.iter().sum();
    let top_decile_value: f64 = sorted.iter().take(sorted.len() / 10).sum();

    Some(ClvSummary {
        customers: sorted.len(),
        average_value,
        top_decile_value,
        top_decile_share_pct: share_pct(top_decile_value, total_value),
        total_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: &str, recency_days: i64, frequency: u64, monetary: f64) -> CustomerActivity {
        CustomerActivity {
            customer_id: id.to_string(),
            recency_days,
            frequency,
            monetary,
        }
    }

    #[test]
    fn recency_is_inverted_into_the_code() {
        let customers = vec![
            customer("fresh-big", 1, 9, 900.0),
            customer("middle", 30, 5, 400.0),
            customer("stale-small", 120, 1, 20.0),
        ];
        let profiles = score_customers(&customers, 180);

        assert_eq!(profiles[0].rfm_code, "R3F3M3");
        assert_eq!(profiles[0].rfm_segment, "Champions");
        assert_eq!(profiles[1].rfm_code, "R2F2M2");
        assert_eq!(profiles[1].rfm_segment, "Loyal Customers");
        assert_eq!(profiles[2].rfm_code, "R1F1M1");
        assert_eq!(profiles[2].rfm_segment, "Hibernating");
    }

    #[test]
    fn clv_projects_purchase_rate_over_a_year() {
        // 4 orders worth 100 each over 73 days is 20 orders a year.
        assert!((clv_estimate(400.0, 4, 73) - 2_000.0).abs() < 1e-9);
        assert_eq!(clv_estimate(400.0, 0, 73), 0.0);
        assert!(clv_estimate(10.0, 1, 0).is_finite());
    }

    #[test]
    fn clv_summary_uses_top_decile() {
        let spending: Vec<f64> = (1..=20).map(|n| f64::from(n) * 10.0).collect();
        let summary = clv_summary(&spending).expect("summary");
        assert_eq!(summary.customers, 20);
        assert_eq!(summary.total_value, 2_100.0);
        assert_eq!(summary.top_decile_value, 390.0);
        assert!((summary.top_decile_share_pct - 390.0 / 2_100.0 * 100.0).abs() < 1e-9);
        assert_eq!(summary.average_value, 105.0);
    }

    #[test]
    fn empty_customers_produce_nothing() {
        assert!(score_customers(&[], 90).is_empty());
        assert_eq!(clv_summary(&[]), None);
    }
}
