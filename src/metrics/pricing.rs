use std::collections::BTreeMap;

use serde::Serialize;

use super::series::{mean, std_dev};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BenchmarkPosition {
    #[serde(rename = "Above Benchmark")]
    Above,
    #[serde(rename = "Below Benchmark")]
    Below,
    #[serde(rename = "At Benchmark")]
    At,
}

impl BenchmarkPosition {
    pub fn label(self) -> &'static str {
        match self {
            Self::Above => "Above Benchmark",
            Self::Below => "Below Benchmark",
            Self::At => "At Benchmark",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Above, Self::Below, Self::At]
            .into_iter()
            .find(|position| position.label().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkGap {
    pub position: BenchmarkPosition,
    pub difference: f64,
    pub difference_pct: Option<f64>,
}

pub fn benchmark_gap(price: f64, benchmark: f64) -> BenchmarkGap {
    let position = if price > benchmark {
        BenchmarkPosition::Above
    } else if price < benchmark {
        BenchmarkPosition::Below
    } else {
        BenchmarkPosition::At
    };
    let difference_pct = if benchmark == 0.0 {
        None
    } else {
        Some((price - benchmark) / benchmark * 100.0).filter(|pct| pct.is_finite())
    };

    BenchmarkGap {
        position,
        difference: price - benchmark,
        difference_pct,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricingInsight {
    Overpriced(f64),
    Competitive(f64),
    Aligned(f64),
}

impl PricingInsight {
    pub fn message(self) -> String {
        match self {
            Self::Overpriced(pct) => format!(
                "Our prices are {pct:.1}% higher on average. Consider price optimization."
            ),
            Self::Competitive(pct) => {
                format!("We're {:.1}% more competitive on pricing!", pct.abs())
            }
            Self::Aligned(pct) => format!("Prices are well-aligned with market ({pct:+.1}%)"),
        }
    }
}

/// Reads the mean price gap: more than five percent either way is a signal.
pub fn pricing_insight(difference_pcts: &[f64]) -> Option<PricingInsight> {
    let avg = mean(difference_pcts)?;
    Some(if avg > 5.0 {
        PricingInsight::Overpriced(avg)
    } else if avg < -5.0 {
        PricingInsight::Competitive(avg)
    } else {
        PricingInsight::Aligned(avg)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub std_dev: Option<f64>,
}

/// Mean/min/max/count per key, in key order. Non-finite values are skipped.
pub fn group_stats<K, I>(items: I) -> BTreeMap<K, GroupStats>
where
    K: Ord,
    I: IntoIterator<Item = (K, f64)>,
{
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (key, value) in items {
        if value.is_finite() {
            groups.entry(key).or_default().push(value);
        }
    }

    groups
        .into_iter()
        .filter_map(|(key, values)| {
            let stats = GroupStats {
                mean: mean(&values)?,
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                count: values.len(),
                std_dev: std_dev(&values),
            };
            Some((key, stats))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_against_benchmark() {
        let above = benchmark_gap(110.0, 100.0);
        assert_eq!(above.position, BenchmarkPosition::Above);
        assert_eq!(above.difference, 10.0);
        assert_eq!(above.difference_pct, Some(10.0));

        assert_eq!(benchmark_gap(90.0, 100.0).position, BenchmarkPosition::Below);
        assert_eq!(benchmark_gap(100.0, 100.0).position, BenchmarkPosition::At);
    }

    #[test]
    fn zero_benchmark_has_no_percentage() {
        let gap = benchmark_gap(25.0, 0.0);
        assert_eq!(gap.difference_pct, None);
        assert_eq!(gap.position, BenchmarkPosition::Above);
    }

    #[test]
    fn insight_thresholds() {
        assert_eq!(pricing_insight(&[6.0, 8.0]), Some(PricingInsight::Overpriced(7.0)));
        assert_eq!(pricing_insight(&[-10.0]), Some(PricingInsight::Competitive(-10.0)));
        assert_eq!(pricing_insight(&[5.0]), Some(PricingInsight::Aligned(5.0)));
        assert_eq!(pricing_insight(&[]), None);
        assert_eq!(
            PricingInsight::Competitive(-12.34).message(),
            "We're 12.3% more competitive on pricing!"
        );
    }

    #[test]
    fn position_labels_round_trip() {
        assert_eq!(
            BenchmarkPosition::from_label("below benchmark"),
            Some(BenchmarkPosition::Below)
        );
        assert_eq!(BenchmarkPosition::from_label("All"), None);
    }

    #[test]
    fn grouped_price_statistics() {
        let stats = group_stats([
            ("store-b", 10.0),
            ("store-a", 4.0),
            ("store-b", 20.0),
            ("store-a", f64::NAN),
        ]);
        let keys: Vec<&&str> = stats.keys().collect();
        assert_eq!(keys, vec![&"store-a", &"store-b"]);
        let b = &stats["store-b"];
        assert_eq!((b.mean, b.min, b.max, b.count), (15.0, 10.0, 20.0, 2));
        assert_eq!(stats["store-a"].std_dev, None);
    }
}
