use serde::Serialize;

use super::{growth::ratio_or_zero, series::median};

/// Position of a row relative to the medians of two axes. A value equal to
/// the median counts as high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    BothHigh,
    PrimaryOnly,
    SecondaryOnly,
    BothLow,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::BothHigh,
        Quadrant::PrimaryOnly,
        Quadrant::SecondaryOnly,
        Quadrant::BothLow,
    ];

    fn classify(primary_high: bool, secondary_high: bool) -> Self {
        match (primary_high, secondary_high) {
            (true, true) => Self::BothHigh,
            (true, false) => Self::PrimaryOnly,
            (false, true) => Self::SecondaryOnly,
            (false, false) => Self::BothLow,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuadrantSplit {
    pub primary_median: Option<f64>,
    pub secondary_median: Option<f64>,
    pub assignments: Vec<Quadrant>,
}

impl QuadrantSplit {
    pub fn count(&self, quadrant: Quadrant) -> usize {
        self.assignments.iter().filter(|q| **q == quadrant).count()
    }
}

/// Splits rows into four quadrants around the medians of both axes, computed
/// over the rows given. Assignments are returned in input order.
pub fn assign_quadrants<T, P, S>(rows: &[T], primary: P, secondary: S) -> QuadrantSplit
where
    P: Fn(&T) -> f64,
    S: Fn(&T) -> f64,
{
    let primary_values: Vec<f64> = rows.iter().map(&primary).collect();
    let secondary_values: Vec<f64> = rows.iter().map(&secondary).collect();
    let primary_median = median(&primary_values);
    let secondary_median = median(&secondary_values);

    let assignments = primary_values
        .iter()
        .zip(&secondary_values)
        .map(|(p, s)| {
            Quadrant::classify(
                primary_median.is_some_and(|m| *p >= m),
                secondary_median.is_some_and(|m| *s >= m),
            )
        })
        .collect();

    QuadrantSplit {
        primary_median,
        secondary_median,
        assignments,
    }
}

/// Labels for a revenue (primary) by volume (secondary) split.
pub fn product_quadrant(quadrant: Quadrant) -> &'static str {
    match quadrant {
        Quadrant::BothHigh => "Stars",
        Quadrant::PrimaryOnly => "Premium",
        Quadrant::SecondaryOnly => "Volume",
        Quadrant::BothLow => "Question Marks",
    }
}

/// Labels for a purchase frequency (primary) by spending (secondary) split.
pub fn customer_segment(quadrant: Quadrant) -> &'static str {
    match quadrant {
        Quadrant::BothHigh => "VIP Customers",
        Quadrant::PrimaryOnly => "Frequent Buyers",
        Quadrant::SecondaryOnly => "High Spenders",
        Quadrant::BothLow => "Occasional Buyers",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PriceTier {
    Budget,
    MidRange,
    Premium,
    Luxury,
}

impl PriceTier {
    pub const ALL: [PriceTier; 4] = [
        PriceTier::Budget,
        PriceTier::MidRange,
        PriceTier::Premium,
        PriceTier::Luxury,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Budget => "Budget (<$50)",
            Self::MidRange => "Mid-range ($50-100)",
            Self::Premium => "Premium ($100-200)",
            Self::Luxury => "Luxury (>$200)",
        }
    }
}

/// Upper-inclusive bins at 50, 100 and 200.
pub fn price_tier(price: f64) -> Option<PriceTier> {
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    Some(if price <= 50.0 {
        PriceTier::Budget
    } else if price <= 100.0 {
        PriceTier::MidRange
    } else if price <= 200.0 {
        PriceTier::Premium
    } else {
        PriceTier::Luxury
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RatingBand {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl RatingBand {
    pub const ALL: [RatingBand; 4] = [
        RatingBand::Poor,
        RatingBand::Fair,
        RatingBand::Good,
        RatingBand::Excellent,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Poor => "Poor (0-2)",
            Self::Fair => "Fair (2-3)",
            Self::Good => "Good (3-4)",
            Self::Excellent => "Excellent (4-5)",
        }
    }
}

pub fn rating_band(rating: f64) -> Option<RatingBand> {
    if !(0.0..=5.0).contains(&rating) {
        return None;
    }
    Some(if rating <= 2.0 {
        RatingBand::Poor
    } else if rating <= 3.0 {
        RatingBand::Fair
    } else if rating <= 4.0 {
        RatingBand::Good
    } else {
        RatingBand::Excellent
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryHealth {
    Excellent,
    Good,
    NeedsAttention,
}

impl InventoryHealth {
    pub fn message(self, in_stock_rate: f64) -> String {
        match self {
            Self::Excellent => format!("Excellent Stock Health: {in_stock_rate:.1}% in-stock rate"),
            Self::Good => format!("Good Stock Health: {in_stock_rate:.1}% in-stock rate"),
            Self::NeedsAttention => {
                format!("Stock Needs Attention: Only {in_stock_rate:.1}% in-stock rate")
            }
        }
    }
}

pub fn in_stock_rate(in_stock: f64, total: f64) -> f64 {
    ratio_or_zero(in_stock, total) * 100.0
}

pub fn inventory_health(in_stock_rate: f64) -> InventoryHealth {
    if in_stock_rate >= 90.0 {
        InventoryHealth::Excellent
    } else if in_stock_rate >= 75.0 {
        InventoryHealth::Good
    } else {
        InventoryHealth::NeedsAttention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS: [(f64, f64); 4] = [(100.0, 10.0), (100.0, 1.0), (10.0, 10.0), (10.0, 1.0)];

    #[test]
    fn four_products_land_in_four_quadrants() {
        let split = assign_quadrants(&PRODUCTS, |p| p.0, |p| p.1);
        assert_eq!(split.primary_median, Some(55.0));
        assert_eq!(split.secondary_median, Some(5.5));
        let labels: Vec<&str> = split.assignments.iter().copied().map(product_quadrant).collect();
        assert_eq!(labels, vec!["Stars", "Premium", "Volume", "Question Marks"]);
    }

    #[test]
    fn quadrants_are_stable_under_reordering() {
        let reversed: Vec<(f64, f64)> = PRODUCTS.iter().rev().copied().collect();
        let forward = assign_quadrants(&PRODUCTS, |p| p.0, |p| p.1);
        let backward = assign_quadrants(&reversed, |p| p.0, |p| p.1);
        for (idx, product) in PRODUCTS.iter().enumerate() {
            let moved = reversed.iter().position(|p| p == product).expect("present");
            assert_eq!(forward.assignments[idx], backward.assignments[moved]);
        }
    }

    #[test]
    fn median_value_counts_as_high() {
        let customers = [(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)];
        let split = assign_quadrants(&customers, |c| c.0, |c| c.1);
        assert_eq!(customer_segment(split.assignments[1]), "VIP Customers");
        assert_eq!(customer_segment(split.assignments[0]), "Occasional Buyers");
        assert_eq!(split.count(Quadrant::BothHigh), 2);
    }

    #[test]
    fn empty_input_yields_empty_split() {
        let split = assign_quadrants(&[] as &[(f64, f64)], |p| p.0, |p| p.1);
        assert!(split.assignments.is_empty());
        assert_eq!(split.primary_median, None);
    }

    #[test]
    fn price_tiers_are_upper_inclusive() {
        assert_eq!(price_tier(0.0), Some(PriceTier::Budget));
        assert_eq!(price_tier(50.0), Some(PriceTier::Budget));
        assert_eq!(price_tier(50.01), Some(PriceTier::MidRange));
        assert_eq!(price_tier(200.0), Some(PriceTier::Premium));
        assert_eq!(price_tier(999.0), Some(PriceTier::Luxury));
        assert_eq!(price_tier(f64::NAN), None);
    }

    #[test]
    fn rating_bands() {
        assert_eq!(rating_band(1.5), Some(RatingBand::Poor));
        assert_eq!(rating_band(3.0), Some(RatingBand::Fair));
        assert_eq!(rating_band(4.2), Some(RatingBand::Excellent));
        assert_eq!(rating_band(5.5), None);
    }

    #[test]
    fn inventory_health_thresholds() {
        assert_eq!(inventory_health(in_stock_rate(90.0, 100.0)), InventoryHealth::Excellent);
        assert_eq!(inventory_health(75.0), InventoryHealth::Good);
        assert_eq!(inventory_health(74.9), InventoryHealth::NeedsAttention);
        assert_eq!(in_stock_rate(3.0, 0.0), 0.0);
    }
}
