//! Pure computations over query results. Nothing here touches the warehouse.

mod growth;
mod pricing;
mod rfm;
mod segments;
mod series;

pub use growth::{comparison_window, growth_pct, ratio_or_zero, round2, share_pct, Growth};
pub use pricing::{benchmark_gap, group_stats, pricing_insight, BenchmarkPosition, PricingInsight};
pub use rfm::{clv_summary, score_customers, CustomerActivity};
pub use segments::{
    assign_quadrants, customer_segment, in_stock_rate, inventory_health, price_tier,
    product_quadrant, rating_band, InventoryHealth, PriceTier, Quadrant, RatingBand,
};
pub use series::{mean, median, moving_average, std_dev, weekday_totals};
