use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{blank_as_none, check_window, contains_ci, date_window, parse_day, selected, split_list};
use crate::{
    cache::{FilterSource, QueryService},
    metrics::{
        assign_quadrants, benchmark_gap, clv_summary, customer_segment, group_stats, mean,
        pricing_insight, ratio_or_zero, round2, score_customers, share_pct, std_dev,
        BenchmarkPosition, CustomerActivity, PricingInsight, Quadrant,
    },
    models::{ChartKind, ChartSpec, Kpi, Level, Section},
    pipeline::{decode, Dashboard},
    shell::Page,
    table::Table,
    warehouse::{FilterClause, SqlParam},
};

const COMPETITOR_WINDOW_DAYS: i64 = 90;
const CUSTOMER_WINDOW_DAYS: i64 = 180;
const DEFAULT_STORES: usize = 3;
const POSITIONING_POINTS: usize = 50;
const TOP_CUSTOMERS: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkingFilters {
    #[serde(default)]
    pub brand: Option<String>,
    /// `Above Benchmark`, `Below Benchmark` or `At Benchmark`.
    #[serde(default)]
    pub comparison: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub competitor_brand: Option<String>,
    /// Comma-separated competitor stores.
    #[serde(default)]
    pub stores: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub competitor_start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub competitor_end: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub customer_start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub customer_end: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_spending: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_frequency: Option<f64>,
    /// Comma-separated customer segment labels.
    #[serde(default)]
    pub segments: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BenchmarkingView;

#[derive(Debug, Deserialize)]
struct ComparisonRow {
    product_title: String,
    brand: Option<String>,
    product_price: Option<f64>,
    benchmark_site_price: Option<f64>,
    benchmark_store: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ComparisonPoint {
    product_title: String,
    brand: Option<String>,
    product_price: f64,
    benchmark_site_price: f64,
    price_difference: f64,
    price_diff_pct: Option<f64>,
    price_comparison: BenchmarkPosition,
    benchmark_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompetitorRow {
    benchmark_store: String,
    benchmark_catg: Option<String>,
    benchmark_site_price: f64,
    price_scrape_date: String,
    benchmark_item_sub_desc: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct PriceTrendPoint {
    date: String,
    store: String,
    avg_price: f64,
    min_price: f64,
    max_price: f64,
    product_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CategoryPrice {
    category: String,
    avg_price: f64,
    product_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct StorePrice {
    store: String,
    avg_price: f64,
    min_price: f64,
    max_price: f64,
    products: usize,
}

#[derive(Debug, Deserialize)]
struct PaymentRow {
    payment_method: Option<String>,
    total_transactions: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CustomerRow {
    customer_id: Value,
    purchase_frequency: f64,
    total_spending: f64,
    avg_order_value: Option<f64>,
    last_purchase_date: Option<String>,
    days_since_last_purchase: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CustomerPoint {
    customer_id: String,
    segment: &'static str,
    purchase_frequency: f64,
    total_spending: f64,
    avg_order_value: Option<f64>,
    days_since_last_purchase: Option<i64>,
    last_purchase_date: Option<String>,
    rfm_code: String,
    rfm_segment: &'static str,
    clv: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct SegmentValue {
    segment: &'static str,
    total_revenue: f64,
    customer_count: usize,
    revenue_per_customer: f64,
}

enum Competitors {
    NoBrands,
    NoStores,
    Found {
        brand: String,
        rows: Vec<CompetitorRow>,
    },
}

pub struct BenchmarkingData {
    comparisons: Vec<ComparisonRow>,
    competitors: Competitors,
    hierarchy: Table,
    payments: Table,
    customers: Vec<CustomerRow>,
    customer_span_days: i64,
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Dashboard for BenchmarkingView {
    type Filters = BenchmarkingFilters;
    type Data = BenchmarkingData;

    fn page(&self) -> Page {
        Page::Benchmarking
    }

    fn validate(&self, filters: &BenchmarkingFilters) -> Result<(), String> {
        if let Some(label) = selected(&filters.comparison) {
            if BenchmarkPosition::from_label(label).is_none() {
                return Err(format!("Unknown price comparison `{label}`"));
            }
        }
        check_window(filters.competitor_start, filters.competitor_end)?;
        check_window(filters.customer_start, filters.customer_end)
    }

    async fn fetch(&self, queries: &QueryService, filters: &BenchmarkingFilters) -> BenchmarkingData {
        let brand = FilterClause::new().eq("p.BRAND", selected(&filters.brand));
        let comparison_sql = format!(
            "SELECT
    p.PRODUCT_TITLE,
    p.BRAND,
    pr.PRODUCT_PRICE,
    pr.BENCHMARK_BASE_PRICE,
    pr.BENCHMARK_SITE_PRICE,
    b.BENCHMARK_STORE
FROM Products p
JOIN Pricing pr ON p.ITEM_ID = pr.ITEM_ID
JOIN Benchmark b ON pr.BENCHMARK_ID = b.BENCHMARK_ID
WHERE pr.BENCHMARK_SITE_PRICE IS NOT NULL
{}",
            brand.sql()
        );
        let comparisons = queries.run_query(&comparison_sql, brand.params()).await;

        let competitors = fetch_competitors(queries, filters).await;

        let hierarchy = queries
            .run_query(
                "SELECT
    b.BENCHMARK_CATG,
    b.BENCHMARK_SUBCATG,
    b.BENCHMARK_STORE,
    COUNT(DISTINCT b.BENCHMARK_ID) AS product_count,
    AVG(pr.BENCHMARK_SITE_PRICE) AS avg_price
FROM Benchmark b
JOIN Pricing pr ON b.BENCHMARK_ID = pr.BENCHMARK_ID
WHERE pr.BENCHMARK_SITE_PRICE IS NOT NULL
GROUP BY b.BENCHMARK_CATG, b.BENCHMARK_SUBCATG, b.BENCHMARK_STORE
ORDER BY product_count DESC",
                &[],
            )
            .await;

        let (start, end) = date_window(filters.customer_start, filters.customer_end, CUSTOMER_WINDOW_DAYS);
        let window = [SqlParam::from(start), SqlParam::from(end)];
        let payments = queries
            .run_query(
                "SELECT
    s.PAYMENT_METHOD,
    COUNT(s.SALE_ID) AS total_transactions,
    SUM(s.TOTAL_SALE_AMOUNT) AS total_revenue,
    AVG(s.TOTAL_SALE_AMOUNT) AS avg_transaction_value
FROM Sales s
WHERE s.SALE_DATE BETWEEN ? AND ?
GROUP BY s.PAYMENT_METHOD
ORDER BY total_transactions DESC",
                &window,
            )
            .await;
        let customers = queries
            .run_query(
                "SELECT
    s.CUSTOMER_ID,
    COUNT(DISTINCT s.SALE_ID) AS purchase_frequency,
    SUM(s.TOTAL_SALE_AMOUNT) AS total_spending,
    AVG(s.TOTAL_SALE_AMOUNT) AS avg_order_value,
    MAX(s.SALE_DATE) AS last_purchase_date,
    DATEDIFF(day, MAX(s.SALE_DATE), CURRENT_DATE) AS days_since_last_purchase
FROM Sales s
WHERE s.SALE_DATE BETWEEN ? AND ?
GROUP BY s.CUSTOMER_ID
ORDER BY total_spending DESC",
                &window,
            )
            .await;

        BenchmarkingData {
            comparisons: decode(&comparisons, "price_comparison"),
            competitors,
            hierarchy: hierarchy.as_ref().clone(),
            payments: payments.as_ref().clone(),
            customers: decode(&customers, "customer_segmentation"),
            customer_span_days: (end - start).num_days(),
        }
    }

    fn transform(&self, data: BenchmarkingData, filters: &BenchmarkingFilters) -> Vec<Section> {
        let mut sections = Vec::new();
        comparison_sections(&mut sections, data.comparisons, filters);
        competitor_sections(&mut sections, data.competitors);
        sections.push(Section::chart(
            "category-hierarchy",
            "Market Share by Category",
            ChartSpec::new(ChartKind::Sunburst, "BENCHMARK_CATG", &["PRODUCT_COUNT"])
                .path(&["BENCHMARK_CATG", "BENCHMARK_SUBCATG", "BENCHMARK_STORE"])
                .color("AVG_PRICE"),
            data.hierarchy,
        ));
        payment_sections(&mut sections, data.payments);
        customer_sections(&mut sections, data.customers, data.customer_span_days, filters);
        sections
    }
}

async fn fetch_competitors(queries: &QueryService, filters: &BenchmarkingFilters) -> Competitors {
    let brand = match selected(&filters.competitor_brand) {
        Some(brand) => brand.to_string(),
        None => match queries
            .filter_options(FilterSource::BenchmarkBrands)
            .await
            .into_iter()
            .next()
        {
            Some(first) => first,
            None => return Competitors::NoBrands,
        },
    };

    let mut stores = split_list(&filters.stores);
    if stores.is_empty() {
        stores = queries
            .filter_options(FilterSource::Stores)
            .await
            .into_iter()
            .take(DEFAULT_STORES)
            .collect();
    }
    if stores.is_empty() {
        return Competitors::NoStores;
    }

    let (start, end) = date_window(filters.competitor_start, filters.competitor_end, COMPETITOR_WINDOW_DAYS);
    let clause = FilterClause::new()
        .eq("b.BENCHMARK_BRAND_NAME", Some(brand.as_str()))
        .one_of("b.BENCHMARK_STORE", &stores);
    let sql = format!(
        "SELECT
    b.BENCHMARK_BRAND_NAME,
    b.BENCHMARK_STORE,
    b.BENCHMARK_CATG,
    b.BENCHMARK_SUBCATG,
    pr.BENCHMARK_SITE_PRICE,
    pr.PRICE_SCRAPE_DATE,
    b.BENCHMARK_ITEM_SUB_DESC
FROM Benchmark b
JOIN Pricing pr ON b.BENCHMARK_ID = pr.BENCHMARK_ID
WHERE pr.BENCHMARK_SITE_PRICE IS NOT NULL
{}
AND pr.PRICE_SCRAPE_DATE BETWEEN ? AND ?
ORDER BY pr.PRICE_SCRAPE_DATE",
        clause.sql()
    );
    let mut params = clause.params().to_vec();
    params.extend([SqlParam::from(start), SqlParam::from(end)]);

    let rows = queries.run_query(&sql, &params).await;
    Competitors::Found {
        brand,
        rows: decode(&rows, "competitor_pricing"),
    }
}

fn comparison_sections(sections: &mut Vec<Section>, rows: Vec<ComparisonRow>, filters: &BenchmarkingFilters) {
    if rows.is_empty() {
        sections.push(Section::empty(
            "price-comparison",
            "Price Benchmarking Analysis",
            "No price comparison data available",
        ));
        return;
    }

    let wanted = selected(&filters.comparison).and_then(BenchmarkPosition::from_label);
    let search = selected(&filters.search);
    let mut points: Vec<ComparisonPoint> = rows
        .into_iter()
        .filter_map(|row| {
            let (Some(price), Some(benchmark)) = (row.product_price, row.benchmark_site_price) else {
                return None;
            };
            let gap = benchmark_gap(price, benchmark);
            Some(ComparisonPoint {
                product_title: row.product_title,
                brand: row.brand,
                product_price: price,
                benchmark_site_price: benchmark,
                price_difference: round2(gap.difference),
                price_diff_pct: gap.difference_pct.map(round2),
                price_comparison: gap.position,
                benchmark_store: row.benchmark_store,
            })
        })
        .filter(|point| wanted.map_or(true, |position| point.price_comparison == position))
        .filter(|point| search.map_or(true, |term| contains_ci(&point.product_title, term)))
        .collect();
    points.sort_by(|a, b| {
        let key = |p: &ComparisonPoint| p.price_diff_pct.unwrap_or(f64::NEG_INFINITY);
        key(b).total_cmp(&key(a))
    });

    if points.is_empty() {
        sections.push(Section::empty(
            "price-comparison",
            "Price Benchmarking Analysis",
            "No products found matching your criteria. Please adjust filters.",
        ));
        return;
    }

    let count = |position: BenchmarkPosition| {
        points.iter().filter(|p| p.price_comparison == position).count() as f64
    };
    let pcts: Vec<f64> = points.iter().filter_map(|p| p.price_diff_pct).collect();
    let avg_diff = mean(&pcts).unwrap_or(0.0);
    sections.push(Section::kpis(
        "benchmark-kpis",
        "Price Benchmarking Analysis",
        vec![
            Kpi::count("At Benchmark", count(BenchmarkPosition::At)),
            Kpi::count("Below Benchmark", count(BenchmarkPosition::Below))
                .with_caption("More competitive"),
            Kpi::count("Above Benchmark", count(BenchmarkPosition::Above))
                .with_caption("Premium pricing"),
            Kpi::percent("Avg Price Difference", round2(avg_diff)),
        ],
    ));

    let positioning: Vec<ComparisonPoint> = points.iter().take(POSITIONING_POINTS).cloned().collect();
    sections.push(Section::chart(
        "price-positioning",
        "Price Positioning vs Competitors",
        ChartSpec::new(ChartKind::Scatter, "BENCHMARK_SITE_PRICE", &["PRODUCT_PRICE"])
            .color("PRICE_COMPARISON"),
        Table::from_records(&positioning),
    ));
    sections.push(Section::chart(
        "price-gaps",
        "Price Gap Analysis",
        ChartSpec::new(ChartKind::Histogram, "PRICE_DIFF_PCT", &[]).reference("x", Some(0.0), "Parity"),
        Table::from_records(&points),
    ));

    if let Some(insight) = pricing_insight(&pcts) {
        let level = match insight {
            PricingInsight::Overpriced(_) => Level::Warning,
            PricingInsight::Competitive(_) => Level::Success,
            PricingInsight::Aligned(_) => Level::Info,
        };
        sections.push(Section::insight("pricing-insight", "Pricing Insight", level, insight.message()));
    }

    sections.push(Section::table(
        "price-comparison",
        "Detailed Price Comparison",
        Table::from_records(&points),
    ));
}

fn competitor_sections(sections: &mut Vec<Section>, competitors: Competitors) {
    let (brand, rows) = match competitors {
        Competitors::NoBrands => {
            sections.push(Section::empty(
                "competitor-trend",
                "Competitor Pricing Trends",
                "No competitor brands found",
            ));
            return;
        }
        Competitors::NoStores => {
            sections.push(Section::insight(
                "competitor-trend",
                "Competitor Pricing Trends",
                Level::Info,
                "Please select at least one store and a valid date range",
            ));
            return;
        }
        Competitors::Found { brand, rows } => (brand, rows),
    };
    if rows.is_empty() {
        sections.push(Section::empty(
            "competitor-trend",
            "Competitor Pricing Trends",
            "No competitor data available for selected filters",
        ));
        return;
    }

    let trend: Vec<PriceTrendPoint> = group_stats(rows.iter().map(|row| {
        let date = parse_day(&row.price_scrape_date)
            .map(|day| day.to_string())
            .unwrap_or_else(|| row.price_scrape_date.clone());
        ((date, row.benchmark_store.clone()), row.benchmark_site_price)
    }))
    .into_iter()
    .map(|((date, store), stats)| PriceTrendPoint {
        date,
        store,
        avg_price: stats.mean,
        min_price: stats.min,
        max_price: stats.max,
        product_count: stats.count,
    })
    .collect();

    let averages: Vec<f64> = trend.iter().map(|t| t.avg_price).collect();
    let lowest = trend.iter().map(|t| t.min_price).fold(f64::INFINITY, f64::min);
    let highest = trend.iter().map(|t| t.max_price).fold(f64::NEG_INFINITY, f64::max);
    let tracked: BTreeSet<&str> = rows
        .iter()
        .filter_map(|row| row.benchmark_item_sub_desc.as_deref())
        .collect();
    sections.push(Section::kpis(
        "competitor-kpis",
        "Competitor Pricing Trends",
        vec![
            Kpi::currency("Avg Competitor Price", mean(&averages).unwrap_or(0.0)),
            Kpi::text("Price Range", format!("${lowest:.2} - ${highest:.2}")),
            Kpi::count("Products Tracked", tracked.len() as f64),
            Kpi::currency("Price Volatility", std_dev(&averages).unwrap_or(0.0)),
        ],
    ));
    sections.push(Section::chart(
        "competitor-trend",
        format!("{brand} Pricing Trends Across Competitors"),
        ChartSpec::new(ChartKind::Line, "DATE", &["AVG_PRICE"]).color("STORE"),
        Table::from_records(&trend),
    ));

    let mut categories: Vec<CategoryPrice> = group_stats(rows.iter().map(|row| {
        (
            row.benchmark_catg.clone().unwrap_or_else(|| "Uncategorized".to_string()),
            row.benchmark_site_price,
        )
    }))
    .into_iter()
    .map(|(category, stats)| CategoryPrice {
        category,
        avg_price: stats.mean,
        product_count: stats.count,
    })
    .collect();
    categories.sort_by(|a, b| b.avg_price.total_cmp(&a.avg_price));
    sections.push(Section::chart(
        "competitor-categories",
        "Price Distribution by Category",
        ChartSpec::new(ChartKind::HorizontalBar, "CATEGORY", &["AVG_PRICE"]).color("PRODUCT_COUNT"),
        Table::from_records(&categories),
    ));

    let stores: Vec<StorePrice> = group_stats(
        rows.iter()
            .map(|row| (row.benchmark_store.clone(), row.benchmark_site_price)),
    )
    .into_iter()
    .map(|(store, stats)| StorePrice {
        store,
        avg_price: stats.mean,
        min_price: stats.min,
        max_price: stats.max,
        products: stats.count,
    })
    .collect();
    sections.push(Section::table(
        "store-comparison",
        "Store-wise Price Comparison",
        Table::from_records(&stores),
    ));
}

fn payment_sections(sections: &mut Vec<Section>, payments: Table) {
    let rows: Vec<PaymentRow> = decode(&payments, "payment_methods");
    let total: f64 = rows.iter().filter_map(|r| r.total_transactions).sum();
    let top = rows.first().map(|row| {
        (
            row.payment_method.clone().unwrap_or_else(|| "Unknown".to_string()),
            share_pct(row.total_transactions.unwrap_or(0.0), total),
        )
    });

    sections.push(Section::chart(
        "payment-methods",
        "Payment Method Distribution",
        ChartSpec::new(ChartKind::Donut, "PAYMENT_METHOD", &["TOTAL_TRANSACTIONS"]),
        payments.clone(),
    ));
    sections.push(Section::chart(
        "payment-revenue",
        "Revenue by Payment Method",
        ChartSpec::new(ChartKind::Bar, "PAYMENT_METHOD", &["TOTAL_REVENUE"]).color("AVG_TRANSACTION_VALUE"),
        payments,
    ));
    if let Some((method, share)) = top {
        sections.push(Section::insight(
            "top-payment",
            "Payment Method Preferences",
            Level::Info,
            format!("Top Payment Method: {method} accounts for {share:.1}% of all transactions"),
        ));
    }
}

fn customer_sections(
    sections: &mut Vec<Section>,
    rows: Vec<CustomerRow>,
    span_days: i64,
    filters: &BenchmarkingFilters,
) {
    if rows.is_empty() {
        sections.push(Section::empty(
            "customer-segments",
            "Customer Segmentation (RFM Analysis)",
            "No customer data available",
        ));
        return;
    }

    let split = assign_quadrants(&rows, |r| r.purchase_frequency, |r| r.total_spending);
    let activity: Vec<CustomerActivity> = rows
        .iter()
        .map(|row| CustomerActivity {
            customer_id: id_text(&row.customer_id),
            recency_days: row.days_since_last_purchase.unwrap_or(span_days),
            frequency: row.purchase_frequency.max(0.0) as u64,
            monetary: row.total_spending,
        })
        .collect();
    let profiles = score_customers(&activity, span_days);

    let customers: Vec<CustomerPoint> = rows
        .into_iter()
        .zip(&split.assignments)
        .zip(profiles)
        .map(|((row, quadrant), profile)| CustomerPoint {
            customer_id: profile.customer_id,
            segment: customer_segment(*quadrant),
            purchase_frequency: row.purchase_frequency,
            total_spending: row.total_spending,
            avg_order_value: row.avg_order_value,
            days_since_last_purchase: row.days_since_last_purchase,
            last_purchase_date: row
                .last_purchase_date
                .as_deref()
                .and_then(parse_day)
                .map(|day| day.to_string()),
            rfm_code: profile.rfm_code,
            rfm_segment: profile.rfm_segment,
            clv: round2(profile.clv),
        })
        .collect();

    let captions = ["High freq + High spend", "High frequency", "High spending", "Need engagement"];
    sections.push(Section::kpis(
        "customer-segments",
        "Customer Segmentation (RFM Analysis)",
        Quadrant::ALL
            .into_iter()
            .zip(captions)
            .map(|(quadrant, caption)| {
                Kpi::count(customer_segment(quadrant), split.count(quadrant) as f64).with_caption(caption)
            })
            .collect(),
    ));
    sections.push(Section::chart(
        "segmentation-matrix",
        "Customer Segmentation Matrix",
        ChartSpec::new(ChartKind::Scatter, "PURCHASE_FREQUENCY", &["TOTAL_SPENDING"])
            .size("AVG_ORDER_VALUE")
            .color("SEGMENT")
            .reference("y", split.secondary_median, "Median Spending")
            .reference("x", split.primary_median, "Median Frequency"),
        Table::from_records(&customers),
    ));

    let segment_value: Vec<SegmentValue> = Quadrant::ALL
        .into_iter()
        .map(customer_segment)
        .filter_map(|segment| {
            let members: Vec<&CustomerPoint> = customers.iter().filter(|c| c.segment == segment).collect();
            if members.is_empty() {
                return None;
            }
            let total_revenue: f64 = members.iter().map(|c| c.total_spending).sum();
            Some(SegmentValue {
                segment,
                total_revenue,
                customer_count: members.len(),
                revenue_per_customer: ratio_or_zero(total_revenue, members.len() as f64),
            })
        })
        .collect();
    sections.push(Section::chart(
        "segment-value",
        "Revenue by Customer Segment",
        ChartSpec::new(ChartKind::Bar, "SEGMENT", &["TOTAL_REVENUE"]).color("REVENUE_PER_CUSTOMER"),
        Table::from_records(&segment_value),
    ));

    let segments = split_list(&filters.segments);
    let min_spending = filters.min_spending.unwrap_or(0.0);
    let min_frequency = filters.min_frequency.unwrap_or(0.0);
    let matching: Vec<CustomerPoint> = customers
        .into_iter()
        .filter(|c| c.total_spending >= min_spending && c.purchase_frequency >= min_frequency)
        .filter(|c| segments.is_empty() || segments.iter().any(|s| s.eq_ignore_ascii_case(c.segment)))
        .collect();

    if matching.is_empty() {
        sections.push(Section::empty(
            "top-customers",
            "Customer Lifetime Value (CLV) Analysis",
            "No customers match the selected criteria",
        ));
        return;
    }

    sections.push(Section::insight(
        "clv-matches",
        "Customer Lifetime Value (CLV) Analysis",
        Level::Success,
        format!("Showing {} customers matching criteria", matching.len()),
    ));
    let spending: Vec<f64> = matching.iter().map(|c| c.total_spending).collect();
    let top: Vec<CustomerPoint> = matching.into_iter().take(TOP_CUSTOMERS).collect();
    sections.push(Section::table(
        "top-customers",
        "Top Customers",
        Table::from_records(&top),
    ));
    if let Some(summary) = clv_summary(&spending) {
        sections.push(Section::insight("clv-insight", "CLV Insights", Level::Info, summary.message()));
    }
}
