use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{blank_as_none, contains_ci, selected, truncate_chars};
use crate::{
    cache::QueryService,
    metrics::{
        assign_quadrants, in_stock_rate, inventory_health, mean, median, price_tier,
        product_quadrant, rating_band, InventoryHealth, PriceTier, Quadrant, RatingBand,
    },
    models::{ChartKind, ChartSpec, Kpi, Level, Section},
    pipeline::{decode, Dashboard},
    shell::Page,
    table::Table,
    warehouse::{FilterClause, SqlParam},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilters {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Quick stock lookup by product title.
    #[serde(default)]
    pub stock_search: Option<String>,
    /// Narrows the price analysis by product title.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_price: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub max_price: Option<f64>,
    /// Narrows the review table by product title or brand.
    #[serde(default)]
    pub review_search: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_rating: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_reviews: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProductView;

#[derive(Debug, Deserialize)]
struct InventoryRow {
    total_products: Option<f64>,
    in_stock: Option<f64>,
    out_of_stock: Option<f64>,
    limited_stock: Option<f64>,
    avg_daily_sales: Option<f64>,
    total_revenue_30d: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StockRow {
    product_title: String,
    sku: Option<String>,
    availability_indicator: Option<String>,
    product_price: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct StockLookup {
    product_title: String,
    sku: Option<String>,
    availability_indicator: Option<String>,
    product_price: Option<f64>,
    status_level: Level,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(serialize = "SCREAMING_SNAKE_CASE"))]
struct ProfitRow {
    product_title: String,
    brand: Option<String>,
    revenue: f64,
    units_sold: f64,
    avg_price: Option<f64>,
    orders: Option<f64>,
    avg_rating: Option<f64>,
    revenue_per_unit: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ProfitPoint {
    #[serde(flatten)]
    row: ProfitRow,
    quadrant: &'static str,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(serialize = "SCREAMING_SNAKE_CASE"))]
struct PriceRow {
    product_title: String,
    brand: Option<String>,
    avg_sale_price: f64,
    total_sales: Option<f64>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    price_stddev: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all(serialize = "SCREAMING_SNAKE_CASE"))]
struct ReviewRow {
    product_title: String,
    brand: Option<String>,
    avg_rating: f64,
    total_reviews: Option<f64>,
    avg_price: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct BucketCount {
    bucket: &'static str,
    products: usize,
}

pub struct ProductData {
    inventory: Option<InventoryRow>,
    stock_lookup: Option<Vec<StockRow>>,
    top_sellers: Table,
    profitability: Vec<ProfitRow>,
    prices: Vec<PriceRow>,
    reviews: Vec<ReviewRow>,
}

fn product_clause(filters: &ProductFilters) -> FilterClause {
    FilterClause::new()
        .eq("p.BRAND", selected(&filters.brand))
        .eq_expr("SPLIT_PART(p.TAXONOMY, ' > ', 1)", selected(&filters.category))
}

#[async_trait]
impl Dashboard for ProductView {
    type Filters = ProductFilters;
    type Data = ProductData;

    fn page(&self) -> Page {
        Page::ProductAnalytics
    }

    fn validate(&self, filters: &ProductFilters) -> Result<(), String> {
        if let (Some(min), Some(max)) = (filters.min_price, filters.max_price) {
            if min > max {
                return Err("Minimum price must not exceed maximum price".to_string());
            }
        }
        if filters.min_rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
            return Err("Minimum rating must be between 0 and 5".to_string());
        }
        Ok(())
    }

    async fn fetch(&self, queries: &QueryService, filters: &ProductFilters) -> ProductData {
        let clause = product_clause(filters);
        let filter_sql = clause.sql();
        let params = clause.params().to_vec();

        let inventory_sql = format!(
            "WITH InventoryMetrics AS (
    SELECT
        COUNT(DISTINCT p.ITEM_ID) AS total_products,
        SUM(CASE WHEN a.AVAILABILITY_INDICATOR = 'IN_STOCK' THEN 1 ELSE 0 END) AS in_stock,
        SUM(CASE WHEN a.AVAILABILITY_INDICATOR = 'OUT_OF_STOCK' THEN 1 ELSE 0 END) AS out_of_stock,
        SUM(CASE WHEN a.AVAILABILITY_INDICATOR = 'LIMITED_STOCK' THEN 1 ELSE 0 END) AS limited_stock,
        AVG(pr.PRODUCT_PRICE) AS avg_price
    FROM Products p
    LEFT JOIN Availability a ON p.ITEM_ID = a.ITEM_ID
    LEFT JOIN Pricing pr ON p.ITEM_ID = pr.ITEM_ID
    WHERE 1=1 {filter_sql}
),
SalesVelocity AS (
    SELECT
        AVG(daily_sales) AS avg_daily_sales,
        SUM(daily_revenue) AS total_revenue_30d
    FROM (
        SELECT
            s.SALE_DATE,
            SUM(s.QUANTITY_SOLD) AS daily_sales,
            SUM(s.TOTAL_SALE_AMOUNT) AS daily_revenue
        FROM Sales s
        JOIN Products p ON s.ITEM_ID = p.ITEM_ID
        WHERE s.SALE_DATE >= CURRENT_DATE - 30
        {filter_sql}
        GROUP BY s.SALE_DATE
    )
)
SELECT * FROM InventoryMetrics, SalesVelocity"
        );
        let mut inventory_params = params.clone();
        inventory_params.extend_from_slice(clause.params());

        let top_sql = format!(
            "SELECT
    p.PRODUCT_TITLE,
    p.BRAND,
    SUM(s.QUANTITY_SOLD) AS total_quantity_sold,
    SUM(s.TOTAL_SALE_AMOUNT) AS total_revenue,
    COUNT(DISTINCT s.SALE_ID) AS total_orders,
    AVG(s.SALE_PRICE) AS avg_sale_price,
    COALESCE(AVG(r.ITEM_REVIEW_RATING), 0) AS avg_rating
FROM Sales s
JOIN Products p ON s.ITEM_ID = p.ITEM_ID
LEFT JOIN Reviews r ON p.ITEM_ID = r.ITEM_ID
WHERE s.SALE_DATE >= CURRENT_DATE - 90
{filter_sql}
GROUP BY p.PRODUCT_TITLE, p.BRAND
ORDER BY total_quantity_sold DESC
LIMIT 15"
        );

        let profitability_sql = format!(
            "SELECT
    p.PRODUCT_TITLE,
    p.BRAND,
    SUM(s.TOTAL_SALE_AMOUNT) AS revenue,
    SUM(s.QUANTITY_SOLD) AS units_sold,
    AVG(s.SALE_PRICE) AS avg_price,
    COUNT(DISTINCT s.SALE_ID) AS orders,
    COALESCE(AVG(r.ITEM_REVIEW_RATING), 0) AS avg_rating,
    SUM(s.TOTAL_SALE_AMOUNT) / NULLIF(SUM(s.QUANTITY_SOLD), 0) AS revenue_per_unit
FROM Sales s
JOIN Products p ON s.ITEM_ID = p.ITEM_ID
LEFT JOIN Reviews r ON p.ITEM_ID = r.ITEM_ID
WHERE s.SALE_DATE >= CURRENT_DATE - 90
{filter_sql}
GROUP BY p.PRODUCT_TITLE, p.BRAND
HAVING SUM(s.QUANTITY_SOLD) > 0
ORDER BY revenue DESC
LIMIT 100"
        );

        let price_sql = format!(
            "SELECT
    p.PRODUCT_TITLE,
    p.BRAND,
    AVG(s.SALE_PRICE) AS avg_sale_price,
    COUNT(s.SALE_ID) AS total_sales,
    MIN(s.SALE_PRICE) AS min_price,
    MAX(s.SALE_PRICE) AS max_price,
    STDDEV(s.SALE_PRICE) AS price_stddev
FROM Sales s
JOIN Products p ON s.ITEM_ID = p.ITEM_ID
WHERE s.SALE_DATE >= CURRENT_DATE - 90
{filter_sql}
GROUP BY p.PRODUCT_TITLE, p.BRAND
ORDER BY avg_sale_price DESC
LIMIT 30"
        );

        let review_sql = format!(
            "SELECT
    p.PRODUCT_TITLE,
    p.BRAND,
    AVG(r.ITEM_REVIEW_RATING) AS avg_rating,
    SUM(r.ITEM_REVIEW_COUNT) AS total_reviews,
    COUNT(DISTINCT p.ITEM_ID) AS product_count,
    AVG(pr.PRODUCT_PRICE) AS avg_price
FROM Reviews r
JOIN Products p ON r.ITEM_ID = p.ITEM_ID
LEFT JOIN Pricing pr ON p.ITEM_ID = pr.ITEM_ID
WHERE 1=1 {filter_sql}
GROUP BY p.PRODUCT_TITLE, p.BRAND
HAVING AVG(r.ITEM_REVIEW_RATING) IS NOT NULL
ORDER BY avg_rating DESC, total_reviews DESC"
        );

        let stock_lookup = match selected(&filters.stock_search) {
            Some(term) => {
                let sql = format!(
                    "SELECT
    p.PRODUCT_TITLE,
    p.SKU,
    a.AVAILABILITY_INDICATOR,
    pr.PRODUCT_PRICE
FROM Products p
LEFT JOIN Availability a ON p.ITEM_ID = a.ITEM_ID
LEFT JOIN Pricing pr ON p.ITEM_ID = pr.ITEM_ID
WHERE LOWER(p.PRODUCT_TITLE) LIKE LOWER(?)
{filter_sql}
LIMIT 5"
                );
                let mut lookup_params = vec![SqlParam::from(format!("%{term}%"))];
                lookup_params.extend_from_slice(clause.params());
                let table = queries.run_query(&sql, &lookup_params).await;
                Some(decode(&table, "stock_lookup"))
            }
            None => None,
        };

        let inventory = queries.run_query(&inventory_sql, &inventory_params).await;
        let top_sellers = queries.run_query(&top_sql, &params).await;
        let profitability = queries.run_query(&profitability_sql, &params).await;
        let prices = queries.run_query(&price_sql, &params).await;
        let reviews = queries.run_query(&review_sql, &params).await;

        ProductData {
            inventory: decode::<InventoryRow>(&inventory, "inventory").into_iter().next(),
            stock_lookup,
            top_sellers: top_sellers.as_ref().clone(),
            profitability: decode(&profitability, "profitability"),
            prices: decode(&prices, "price_analysis"),
            reviews: decode(&reviews, "reviews"),
        }
    }

    fn transform(&self, data: ProductData, filters: &ProductFilters) -> Vec<Section> {
        let mut sections = Vec::new();
        inventory_sections(&mut sections, data.inventory, data.stock_lookup);

        sections.push(Section::chart(
            "top-sellers",
            "Top Selling Products",
            ChartSpec::new(ChartKind::Bar, "PRODUCT_TITLE", &["TOTAL_QUANTITY_SOLD"])
                .color("TOTAL_REVENUE"),
            data.top_sellers.clone(),
        ));
        sections.push(Section::table(
            "bestsellers",
            "Top 3 Bestsellers",
            data.top_sellers.head(3),
        ));

        profitability_sections(&mut sections, data.profitability);
        price_sections(&mut sections, data.prices, filters);
        review_sections(&mut sections, data.reviews, filters);
        sections
    }
}

fn inventory_sections(
    sections: &mut Vec<Section>,
    inventory: Option<InventoryRow>,
    stock_lookup: Option<Vec<StockRow>>,
) {
    match inventory {
        Some(row) => {
            let total = row.total_products.unwrap_or(0.0);
            let in_stock = row.in_stock.unwrap_or(0.0);
            let limited = row.limited_stock.unwrap_or(0.0);
            let out = row.out_of_stock.unwrap_or(0.0);
            let rate = in_stock_rate(in_stock, total);

            sections.push(Section::kpis(
                "inventory",
                "Inventory Health Dashboard",
                vec![
                    Kpi::percent("In-Stock Rate", rate)
                        .with_caption(format!("{} products", in_stock.round())),
                    Kpi::count("Limited Stock", limited),
                    Kpi::count("Out of Stock", out),
                    Kpi::count("Avg Daily Sales", row.avg_daily_sales.unwrap_or(0.0)),
                    Kpi::currency("Revenue (30d)", row.total_revenue_30d.unwrap_or(0.0)),
                ],
            ));

            let split = Table::from_records(&[
                BucketCount {
                    bucket: "In Stock",
                    products: in_stock as usize,
                },
                BucketCount {
                    bucket: "Limited Stock",
                    products: limited as usize,
                },
                BucketCount {
                    bucket: "Out of Stock",
                    products: out as usize,
                },
            ]);
            sections.push(Section::chart(
                "availability",
                "Inventory Status Distribution",
                ChartSpec::new(ChartKind::Donut, "BUCKET", &["PRODUCTS"]),
                split,
            ));

            if out > 0.0 {
                sections.push(Section::insight(
                    "out-of-stock",
                    "Inventory Insights",
                    Level::Error,
                    format!("Attention Required: {} products are out of stock", out.round()),
                ));
            }
            if limited > 0.0 {
                sections.push(Section::insight(
                    "limited-stock",
                    "Inventory Insights",
                    Level::Warning,
                    format!("Restock Soon: {} products have limited stock", limited.round()),
                ));
            }
            let health = inventory_health(rate);
            let level = match health {
                InventoryHealth::Excellent => Level::Success,
                InventoryHealth::Good => Level::Info,
                InventoryHealth::NeedsAttention => Level::Warning,
            };
            sections.push(Section::insight(
                "stock-health",
                "Inventory Insights",
                level,
                health.message(rate),
            ));
        }
        None => sections.push(Section::empty(
            "inventory",
            "Inventory Health Dashboard",
            "No inventory data available",
        )),
    }

    if let Some(found) = stock_lookup {
        let results: Vec<StockLookup> = found
            .into_iter()
            .map(|row| {
                let status_level = match row.availability_indicator.as_deref() {
                    Some("IN_STOCK") => Level::Success,
                    Some("LIMITED_STOCK") => Level::Warning,
                    _ => Level::Error,
                };
                StockLookup {
                    product_title: truncate_chars(&row.product_title, 50),
                    sku: row.sku,
                    availability_indicator: row.availability_indicator,
                    product_price: row.product_price,
                    status_level,
                }
            })
            .collect();
        if results.is_empty() {
            sections.push(Section::empty("stock-lookup", "Quick Stock Check", "No products found"));
        } else {
            sections.push(Section::table(
                "stock-lookup",
                "Quick Stock Check",
                Table::from_records(&results),
            ));
        }
    }
}

fn profitability_sections(sections: &mut Vec<Section>, rows: Vec<ProfitRow>) {
    if rows.is_empty() {
        sections.push(Section::empty(
            "profitability",
            "Product Profitability Matrix",
            "No data available",
        ));
        return;
    }

    let split = assign_quadrants(&rows, |r| r.revenue, |r| r.units_sold);
    let points: Vec<ProfitPoint> = rows
        .into_iter()
        .zip(&split.assignments)
        .map(|(row, quadrant)| ProfitPoint {
            row,
            quadrant: product_quadrant(*quadrant),
        })
        .collect();

    sections.push(Section::chart(
        "profitability",
        "Product Profitability Matrix",
        ChartSpec::new(ChartKind::Bubble, "UNITS_SOLD", &["REVENUE"])
            .size("AVG_RATING")
            .color("QUADRANT")
            .reference("y", split.primary_median, "Median Revenue")
            .reference("x", split.secondary_median, "Median Volume"),
        Table::from_records(&points),
    ));

    let captions = [
        "Best performers - invest more",
        "High-value items",
        "Popular but low margin",
        "Needs evaluation",
    ];
    sections.push(Section::kpis(
        "quadrants",
        "Quadrant Analysis",
        Quadrant::ALL
            .into_iter()
            .zip(captions)
            .map(|(quadrant, caption)| {
                Kpi::count(product_quadrant(quadrant), split.count(quadrant) as f64)
                    .with_caption(caption)
            })
            .collect(),
    ));
    sections.push(Section::insight(
        "profitability-insight",
        "Strategic Insight",
        Level::Info,
        format!(
            "You have {} star products generating high revenue with strong volume. Focus on maintaining inventory and marketing for these items.",
            split.count(Quadrant::BothHigh)
        ),
    ));
}

fn price_sections(sections: &mut Vec<Section>, rows: Vec<PriceRow>, filters: &ProductFilters) {
    if rows.is_empty() {
        sections.push(Section::empty(
            "price-analysis",
            "Price Analysis & Distribution",
            "No data available",
        ));
        return;
    }

    let search = selected(&filters.search);
    let filtered: Vec<PriceRow> = rows
        .iter()
        .filter(|r| search.map_or(true, |term| contains_ci(&r.product_title, term)))
        .filter(|r| filters.min_price.map_or(true, |min| r.avg_sale_price >= min))
        .filter(|r| filters.max_price.map_or(true, |max| r.avg_sale_price <= max))
        .cloned()
        .collect();

    if filtered.is_empty() {
        sections.push(Section::empty(
            "price-analysis",
            "Price Analysis & Distribution",
            "No products match your search criteria",
        ));
    } else {
        sections.push(Section::chart(
            "price-analysis",
            "Price Analysis & Distribution",
            ChartSpec::new(ChartKind::Bar, "PRODUCT_TITLE", &["AVG_SALE_PRICE", "MIN_PRICE", "MAX_PRICE"])
                .color("AVG_SALE_PRICE"),
            Table::from_records(&filtered),
        ));
    }

    let prices: Vec<f64> = rows.iter().map(|r| r.avg_sale_price).collect();
    let highest = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lowest = prices.iter().copied().fold(f64::INFINITY, f64::min);
    sections.push(Section::kpis(
        "price-stats",
        "Price Statistics",
        vec![
            Kpi::currency("Highest Avg Price", highest),
            Kpi::currency("Lowest Avg Price", lowest),
            Kpi::currency("Mean Price", mean(&prices).unwrap_or(0.0)),
            Kpi::currency("Median Price", median(&prices).unwrap_or(0.0)),
        ],
    ));

    let tiers: Vec<BucketCount> = PriceTier::ALL
        .into_iter()
        .map(|tier| BucketCount {
            bucket: tier.label(),
            products: prices.iter().filter(|p| price_tier(**p) == Some(tier)).count(),
        })
        .collect();
    sections.push(Section::kpis(
        "price-segments",
        "Price Segments",
        tiers
            .iter()
            .map(|t| Kpi::count(t.bucket, t.products as f64))
            .collect(),
    ));
    sections.push(Section::chart(
        "price-distribution",
        "Price Distribution",
        ChartSpec::new(ChartKind::Histogram, "AVG_SALE_PRICE", &[]),
        Table::from_records(&rows),
    ));
}

fn review_sections(sections: &mut Vec<Section>, rows: Vec<ReviewRow>, filters: &ProductFilters) {
    if rows.is_empty() {
        sections.push(Section::empty(
            "reviews",
            "Customer Reviews & Ratings Analysis",
            "No review data available",
        ));
        return;
    }

    let ratings: Vec<f64> = rows.iter().map(|r| r.avg_rating).collect();
    let review_counts: Vec<f64> = rows.iter().map(|r| r.total_reviews.unwrap_or(0.0)).collect();
    let highly_rated = ratings.iter().filter(|r| **r >= 4.0).count();
    let poorly_rated = ratings.iter().filter(|r| **r < 3.0).count();
    let total_reviews: f64 = review_counts.iter().sum();
    let highest = ratings.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    sections.push(Section::kpis(
        "reviews",
        "Customer Reviews & Ratings Analysis",
        vec![
            Kpi::rating("Overall Avg Rating", mean(&ratings).unwrap_or(0.0)),
            Kpi::rating("Highest Rated", highest),
            Kpi::text("Highly Rated (>=4.0)", format!("{highly_rated}/{}", rows.len())),
            Kpi::count("Total Reviews", total_reviews),
            Kpi::count("Needs Attention (<3.0)", poorly_rated as f64),
        ],
    ));

    let median_reviews = median(&review_counts);
    sections.push(Section::chart(
        "rating-vs-reviews",
        "Rating vs Review Volume",
        ChartSpec::new(ChartKind::Scatter, "AVG_RATING", &["TOTAL_REVIEWS"])
            .size("TOTAL_REVIEWS")
            .color("BRAND")
            .reference("y", median_reviews, "Median Reviews")
            .reference("x", Some(4.0), "4.0 Threshold"),
        Table::from_records(&rows),
    ));

    let star_performers = rows
        .iter()
        .filter(|r| {
            r.avg_rating >= 4.0
                && median_reviews.is_some_and(|m| r.total_reviews.unwrap_or(0.0) >= m)
        })
        .count();
    sections.push(Section::insight(
        "star-performers",
        "Star Performers",
        Level::Success,
        format!(
            "Star Performers: {star_performers} products have both high ratings (>=4.0) AND above-median review counts!"
        ),
    ));

    let bands: Vec<BucketCount> = RatingBand::ALL
        .into_iter()
        .map(|band| BucketCount {
            bucket: band.label(),
            products: ratings.iter().filter(|r| rating_band(**r) == Some(band)).count(),
        })
        .filter(|b| b.products > 0)
        .collect();
    sections.push(Section::chart(
        "rating-distribution",
        "Rating Distribution",
        ChartSpec::new(ChartKind::Donut, "BUCKET", &["PRODUCTS"]),
        Table::from_records(&bands),
    ));

    let top: Vec<ReviewRow> = rows.iter().take(10).cloned().collect();
    let bottom: Vec<ReviewRow> = rows.iter().skip(rows.len().saturating_sub(10)).cloned().collect();
    sections.push(Section::chart(
        "top-rated",
        "Top 10 Best Rated Products",
        ChartSpec::new(ChartKind::HorizontalBar, "PRODUCT_TITLE", &["AVG_RATING"]),
        Table::from_records(&top),
    ));
    sections.push(Section::chart(
        "bottom-rated",
        "Bottom 10 Products (Need Improvement)",
        ChartSpec::new(ChartKind::HorizontalBar, "PRODUCT_TITLE", &["AVG_RATING"]),
        Table::from_records(&bottom),
    ));

    let search = selected(&filters.review_search);
    let min_rating = filters.min_rating.unwrap_or(0.0);
    let min_reviews = filters.min_reviews.unwrap_or(0.0);
    let matching: Vec<ReviewRow> = rows
        .into_iter()
        .filter(|r| {
            search.map_or(true, |term| {
                contains_ci(&r.product_title, term)
                    || r.brand.as_deref().is_some_and(|b| contains_ci(b, term))
            })
        })
        .filter(|r| r.avg_rating >= min_rating && r.total_reviews.unwrap_or(0.0) >= min_reviews)
        .collect();
    if matching.is_empty() {
        sections.push(Section::empty(
            "review-search",
            "Search Product Reviews",
            "No products match the selected criteria",
        ));
    } else {
        sections.push(Section::table(
            "review-search",
            format!("Found {} products matching criteria", matching.len()),
            Table::from_records(&matching),
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;

    use super::*;
    use crate::{
        limits::RowLimits,
        models::SectionBody,
        pipeline::render,
        warehouse::fake::FakeWarehouse,
    };

    fn profitability() -> Table {
        let cols = ["PRODUCT_TITLE", "BRAND", "REVENUE", "UNITS_SOLD", "AVG_PRICE", "ORDERS", "AVG_RATING", "REVENUE_PER_UNIT"];
        Table::new(
            cols.iter().map(ToString::to_string).collect(),
            [("Phone", 100.0, 10.0), ("Watch", 100.0, 1.0), ("Cable", 10.0, 10.0), ("Case", 10.0, 1.0)]
                .iter()
                .map(|(title, revenue, units)| {
                    vec![json!(title), json!("Acme"), json!(revenue), json!(units), json!(10.0), json!(1), json!(4.0), json!(1.0)]
                })
                .collect(),
        )
    }

    fn reviews() -> Table {
        Table::new(
            ["PRODUCT_TITLE", "BRAND", "AVG_RATING", "TOTAL_REVIEWS", "PRODUCT_COUNT", "AVG_PRICE"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            vec![
                vec![json!("Phone"), json!("Acme"), json!(4.6), json!(300), json!(1), json!(499.0)],
                vec![json!("Cable"), json!("Globex"), json!(4.1), json!(20), json!(1), json!(9.0)],
                vec![json!("Case"), json!("Acme"), json!(2.5), json!(150), json!(1), json!(19.0)],
            ],
        )
    }

    fn inventory(in_stock: i64, total: i64) -> Table {
        Table::new(
            ["TOTAL_PRODUCTS", "IN_STOCK", "OUT_OF_STOCK", "LIMITED_STOCK", "AVG_PRICE", "AVG_DAILY_SALES", "TOTAL_REVENUE_30D"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            vec![vec![json!(total), json!(in_stock), json!(total - in_stock), json!(0), json!(50.0), json!(12.5), json!(9_000.0)]],
        )
    }

    async fn sections_for(fake: FakeWarehouse, filters: ProductFilters) -> (Arc<FakeWarehouse>, Vec<Section>) {
        let fake = Arc::new(fake);
        let queries = QueryService::new(fake.clone(), Duration::from_secs(60), 64);
        let page = render(&ProductView, &queries, &RowLimits::default(), filters)
            .await
            .expect("render");
        (fake, page.sections)
    }

    fn find<'a>(sections: &'a [Section], id: &str) -> &'a Section {
        sections.iter().find(|s| s.id == id).expect("section present")
    }

    #[tokio::test]
    async fn profitability_labels_each_product() {
        let (_, sections) = sections_for(
            FakeWarehouse::new().respond("HAVING SUM(s.QUANTITY_SOLD) > 0", profitability()),
            ProductFilters::default(),
        )
        .await;

        let rows = find(&sections, "profitability").rows().expect("rows");
        let labels: Vec<&serde_json::Value> = (0..4).filter_map(|i| rows.cell(i, "QUADRANT")).collect();
        assert_eq!(labels, vec![&json!("Stars"), &json!("Premium"), &json!("Volume"), &json!("Question Marks")]);

        let SectionBody::Kpis { items } = &find(&sections, "quadrants").body else {
            panic!("quadrant counts expected");
        };
        assert!(items.iter().all(|kpi| kpi.value == json!(1.0)));
    }

    #[tokio::test]
    async fn inventory_health_follows_in_stock_rate() {
        let (_, sections) = sections_for(
            FakeWarehouse::new().respond("InventoryMetrics", inventory(80, 100)),
            ProductFilters::default(),
        )
        .await;
        let SectionBody::Insight { level, message } = &find(&sections, "stock-health").body else {
            panic!("insight expected");
        };
        assert_eq!(*level, Level::Info);
        assert!(message.contains("80.0%"));
        assert!(sections.iter().any(|s| s.id == "out-of-stock"));
        assert!(sections.iter().all(|s| s.id != "limited-stock"));
    }

    #[tokio::test]
    async fn review_filters_and_star_performers() {
        let filters = ProductFilters {
            review_search: Some("acme".into()),
            min_rating: Some(3.0),
            ..ProductFilters::default()
        };
        let (_, sections) = sections_for(FakeWarehouse::new().respond("FROM Reviews r", reviews()), filters).await;

        let SectionBody::Insight { message, .. } = &find(&sections, "star-performers").body else {
            panic!("insight expected");
        };
        assert!(message.starts_with("Star Performers: 1 products"));

        let matches = find(&sections, "review-search").rows().expect("rows");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches.cell(0, "PRODUCT_TITLE"), Some(&json!("Phone")));
    }

    #[tokio::test]
    async fn stock_lookup_binds_the_search_term() {
        let filters = ProductFilters {
            brand: Some("Acme".into()),
            stock_search: Some("phone".into()),
            ..ProductFilters::default()
        };
        let (fake, sections) = sections_for(FakeWarehouse::new(), filters).await;

        let executed = fake.executed.lock().expect("lock");
        let (sql, params) = executed
            .iter()
            .find(|(sql, _)| sql.contains("LIKE LOWER(?)"))
            .expect("lookup query");
        assert!(!sql.contains("phone"));
        assert_eq!(params[0], SqlParam::from("%phone%"));
        assert_eq!(params[1], SqlParam::from("Acme"));
        assert!(matches!(find(&sections, "stock-lookup").body, SectionBody::Empty { .. }));
    }

    #[test]
    fn inverted_price_range_is_rejected() {
        let filters = ProductFilters {
            min_price: Some(200.0),
            max_price: Some(100.0),
            ..ProductFilters::default()
        };
        assert!(ProductView.validate(&filters).is_err());
    }
}
