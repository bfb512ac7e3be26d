use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{blank_as_none, check_window, date_window, parse_day, selected};
use crate::{
    cache::QueryService,
    metrics::{comparison_window, growth_pct, moving_average, ratio_or_zero, share_pct, weekday_totals},
    models::{ChartKind, ChartSpec, Kpi, Level, Section},
    pipeline::{decode, Dashboard},
    shell::Page,
    table::Table,
    warehouse::{FilterClause, SqlParam},
};

const DEFAULT_WINDOW_DAYS: i64 = 90;
const MOVING_AVERAGE_WINDOW: usize = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesFilters {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SalesView;

#[derive(Debug, Default, Deserialize)]
struct KpiRow {
    total_revenue: Option<f64>,
    total_orders: Option<f64>,
    unique_customers: Option<f64>,
    avg_order_value: Option<f64>,
    units_sold: Option<f64>,
    total_discounts: Option<f64>,
    prev_revenue: Option<f64>,
    prev_orders: Option<f64>,
    prev_aov: Option<f64>,
    prev_customers: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TrendRow {
    sale_date: String,
    daily_revenue: Option<f64>,
    daily_orders: Option<f64>,
    avg_order_value: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct TrendPoint {
    sale_date: String,
    daily_revenue: f64,
    daily_orders: f64,
    avg_order_value: f64,
    ma7_revenue: Option<f64>,
    ma7_orders: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WeekdayPoint {
    day_of_week: &'static str,
    revenue: f64,
    orders: f64,
}

#[derive(Debug, Deserialize)]
struct MerchantRow {
    third_party_merchant_name: String,
    revenue: Option<f64>,
    orders: Option<f64>,
    aov: Option<f64>,
    discount_rate: Option<f64>,
}

pub struct SalesData {
    window: (NaiveDate, NaiveDate),
    kpis: Option<KpiRow>,
    trend: Vec<TrendRow>,
    categories: Table,
    brands: Table,
    products: Table,
    merchants: Table,
}

const SALES_SCOPE: &str = "FROM Sales s
JOIN Products p ON s.ITEM_ID = p.ITEM_ID
JOIN Third_Party_Merchants m ON s.MERCHANT_ID = m.MERCHANT_ID
WHERE s.SALE_DATE BETWEEN ? AND ?";

fn scoped_params(start: NaiveDate, end: NaiveDate, clause: &FilterClause) -> Vec<SqlParam> {
    let mut params = vec![SqlParam::from(start), SqlParam::from(end)];
    params.extend_from_slice(clause.params());
    params
}

impl SalesView {
    fn clauses(filters: &SalesFilters) -> (FilterClause, FilterClause, FilterClause) {
        let brand = selected(&filters.brand);
        let merchant = selected(&filters.merchant);
        let both = FilterClause::new()
            .eq("p.BRAND", brand)
            .eq("m.THIRD_PARTY_MERCHANT_NAME", merchant);
        let merchant_only = FilterClause::new().eq("m.THIRD_PARTY_MERCHANT_NAME", merchant);
        let brand_only = FilterClause::new().eq("p.BRAND", brand);
        (both, merchant_only, brand_only)
    }
}

#[async_trait]
impl Dashboard for SalesView {
    type Filters = SalesFilters;
    type Data = SalesData;

    fn page(&self) -> Page {
        Page::SalesPerformance
    }

    fn validate(&self, filters: &SalesFilters) -> Result<(), String> {
        check_window(filters.start, filters.end)
    }

    async fn fetch(&self, queries: &QueryService, filters: &SalesFilters) -> SalesData {
        let (start, end) = date_window(filters.start, filters.end, DEFAULT_WINDOW_DAYS);
        let (prev_start, prev_end) = comparison_window(start, end);
        let (both, merchant_only, brand_only) = Self::clauses(filters);
        let filter_sql = both.sql();

        let kpi_sql = format!(
            "WITH CurrentPeriod AS (
    SELECT
        SUM(s.TOTAL_SALE_AMOUNT) AS total_revenue,
        COUNT(DISTINCT s.SALE_ID) AS total_orders,
        COUNT(DISTINCT s.CUSTOMER_ID) AS unique_customers,
        AVG(s.TOTAL_SALE_AMOUNT) AS avg_order_value,
        SUM(s.QUANTITY_SOLD) AS units_sold,
        SUM(s.DISCOUNT_APPLIED) AS total_discounts
    {SALES_SCOPE}
    {filter_sql}
),
PreviousPeriod AS (
    SELECT
        SUM(s.TOTAL_SALE_AMOUNT) AS prev_revenue,
        COUNT(DISTINCT s.SALE_ID) AS prev_orders,
        AVG(s.TOTAL_SALE_AMOUNT) AS prev_aov,
        COUNT(DISTINCT s.CUSTOMER_ID) AS prev_customers
    {SALES_SCOPE}
    {filter_sql}
)
SELECT cp.*, pp.prev_revenue, pp.prev_orders, pp.prev_aov, pp.prev_customers
FROM CurrentPeriod cp, PreviousPeriod pp"
        );
        let mut kpi_params = scoped_params(start, end, &both);
        kpi_params.extend(scoped_params(prev_start, prev_end, &both));

        let trend_sql = format!(
            "SELECT
    s.SALE_DATE,
    SUM(s.TOTAL_SALE_AMOUNT) AS daily_revenue,
    COUNT(DISTINCT s.SALE_ID) AS daily_orders,
    AVG(s.TOTAL_SALE_AMOUNT) AS avg_order_value
{SALES_SCOPE}
{filter_sql}
GROUP BY s.SALE_DATE
ORDER BY s.SALE_DATE"
        );

        let category_sql = format!(
            "SELECT
    SPLIT_PART(p.TAXONOMY, ' > ', 1) AS CATEGORY,
    SUM(s.TOTAL_SALE_AMOUNT) AS revenue,
    COUNT(DISTINCT s.SALE_ID) AS orders,
    SUM(s.QUANTITY_SOLD) AS units_sold,
    ROUND(SUM(s.TOTAL_SALE_AMOUNT) / NULLIF(COUNT(DISTINCT s.SALE_ID), 0), 2) AS aov
{SALES_SCOPE}
{filter_sql}
GROUP BY CATEGORY
ORDER BY revenue DESC
LIMIT 10"
        );

        let brand_sql = format!(
            "SELECT
    p.BRAND,
    SUM(s.TOTAL_SALE_AMOUNT) AS revenue,
    COUNT(DISTINCT s.SALE_ID) AS orders,
    SUM(s.QUANTITY_SOLD) AS units_sold
{SALES_SCOPE}
{}
GROUP BY p.BRAND
ORDER BY revenue DESC
LIMIT 10",
            merchant_only.sql()
        );

        let product_sql = format!(
            "SELECT
    p.PRODUCT_TITLE,
    p.BRAND,
    SUM(s.TOTAL_SALE_AMOUNT) AS revenue,
    SUM(s.QUANTITY_SOLD) AS units_sold,
    COUNT(DISTINCT s.SALE_ID) AS orders,
    AVG(s.SALE_PRICE) AS avg_price,
    COALESCE(AVG(r.ITEM_REVIEW_RATING), 0) AS avg_rating
FROM Sales s
JOIN Products p ON s.ITEM_ID = p.ITEM_ID
JOIN Third_Party_Merchants m ON s.MERCHANT_ID = m.MERCHANT_ID
LEFT JOIN Reviews r ON p.ITEM_ID = r.ITEM_ID
WHERE s.SALE_DATE BETWEEN ? AND ?
{filter_sql}
GROUP BY p.PRODUCT_TITLE, p.BRAND
ORDER BY revenue DESC
LIMIT 20"
        );

        let merchant_sql = format!(
            "SELECT
    m.THIRD_PARTY_MERCHANT_NAME,
    SUM(s.TOTAL_SALE_AMOUNT) AS revenue,
    COUNT(DISTINCT s.SALE_ID) AS orders,
    AVG(s.TOTAL_SALE_AMOUNT) AS aov,
    SUM(s.QUANTITY_SOLD) AS units_sold,
    SUM(s.DISCOUNT_APPLIED) AS total_discounts,
    ROUND((SUM(s.DISCOUNT_APPLIED) / NULLIF(SUM(s.TOTAL_SALE_AMOUNT), 0)) * 100, 2) AS discount_rate
{SALES_SCOPE}
{}
GROUP BY m.THIRD_PARTY_MERCHANT_NAME
ORDER BY revenue DESC",
            brand_only.sql()
        );

        let scoped = scoped_params(start, end, &both);
        let kpis = queries.run_query(&kpi_sql, &kpi_params).await;
        let trend = queries.run_query(&trend_sql, &scoped).await;
        let categories = queries.run_query(&category_sql, &scoped).await;
        let brands = queries
            .run_query(&brand_sql, &scoped_params(start, end, &merchant_only))
            .await;
        let products = queries.run_query(&product_sql, &scoped).await;
        let merchants = queries
            .run_query(&merchant_sql, &scoped_params(start, end, &brand_only))
            .await;

        SalesData {
            window: (start, end),
            kpis: decode::<KpiRow>(&kpis, "sales_kpis").into_iter().next(),
            trend: decode(&trend, "sales_trend"),
            categories: categories.as_ref().clone(),
            brands: brands.as_ref().clone(),
            products: products.as_ref().clone(),
            merchants: merchants.as_ref().clone(),
        }
    }

    fn transform(&self, data: SalesData, _filters: &SalesFilters) -> Vec<Section> {
        let mut sections = Vec::new();
        let (start, end) = data.window;
        let period_days = (end - start).num_days();

        match data.kpis.filter(|row| row.total_orders.unwrap_or(0.0) > 0.0) {
            Some(row) => {
                let revenue = row.total_revenue.unwrap_or(0.0);
                let orders = row.total_orders.unwrap_or(0.0);
                let customers = row.unique_customers.unwrap_or(0.0);
                let aov = row.avg_order_value.unwrap_or(0.0);
                let discounts = row.total_discounts.unwrap_or(0.0);

                sections.push(Section::kpis(
                    "kpis",
                    "Key Performance Indicators",
                    vec![
                        Kpi::currency("Total Revenue", revenue)
                            .with_growth(growth_pct(revenue, row.prev_revenue.unwrap_or(0.0))),
                        Kpi::count("Total Orders", orders)
                            .with_change(orders - row.prev_orders.unwrap_or(0.0)),
                        Kpi::currency("Avg Order Value", aov)
                            .with_growth(growth_pct(aov, row.prev_aov.unwrap_or(0.0))),
                        Kpi::count("Unique Customers", customers)
                            .with_growth(growth_pct(customers, row.prev_customers.unwrap_or(0.0))),
                        Kpi::percent("Conversion Rate", share_pct(orders, customers)),
                        Kpi::currency("Avg Discount", ratio_or_zero(discounts, orders)),
                    ],
                ));
                sections.push(Section::insight(
                    "period-summary",
                    "Period Summary",
                    Level::Info,
                    format!(
                        "Period Summary: {period_days} days | Units Sold: {} | Revenue per Customer: ${:.2} | Discount Rate: {:.1}%",
                        row.units_sold.unwrap_or(0.0).round(),
                        ratio_or_zero(revenue, customers),
                        share_pct(discounts, revenue),
                    ),
                ));
            }
            None => sections.push(Section::empty(
                "kpis",
                "Key Performance Indicators",
                "No sales data available for the selected period",
            )),
        }

        let revenue: Vec<f64> = data.trend.iter().map(|r| r.daily_revenue.unwrap_or(0.0)).collect();
        let orders: Vec<f64> = data.trend.iter().map(|r| r.daily_orders.unwrap_or(0.0)).collect();
        let ma_revenue = moving_average(&revenue, MOVING_AVERAGE_WINDOW);
        let ma_orders = moving_average(&orders, MOVING_AVERAGE_WINDOW);
        let points: Vec<TrendPoint> = data
            .trend
            .iter()
            .enumerate()
            .map(|(idx, row)| TrendPoint {
                sale_date: row.sale_date.clone(),
                daily_revenue: revenue[idx],
                daily_orders: orders[idx],
                avg_order_value: row.avg_order_value.unwrap_or(0.0),
                ma7_revenue: ma_revenue[idx],
                ma7_orders: ma_orders[idx],
            })
            .collect();
        sections.push(Section::chart(
            "trend",
            "Revenue & Orders Trend Over Time",
            ChartSpec::new(
                ChartKind::Combo,
                "SALE_DATE",
                &["DAILY_REVENUE", "MA7_REVENUE", "DAILY_ORDERS"],
            ),
            Table::from_records(&points),
        ));

        let weekdays: Vec<WeekdayPoint> = {
            let revenue_by_day = weekday_totals(
                data.trend
                    .iter()
                    .filter_map(|r| Some((parse_day(&r.sale_date)?, r.daily_revenue.unwrap_or(0.0)))),
            );
            let orders_by_day = weekday_totals(
                data.trend
                    .iter()
                    .filter_map(|r| Some((parse_day(&r.sale_date)?, r.daily_orders.unwrap_or(0.0)))),
            );
            revenue_by_day
                .iter()
                .zip(&orders_by_day)
                .map(|(rev, ord)| WeekdayPoint {
                    day_of_week: rev.day,
                    revenue: rev.total,
                    orders: ord.total,
                })
                .collect()
        };
        let weekday_table = if data.trend.is_empty() {
            Table::empty()
        } else {
            Table::from_records(&weekdays)
        };
        sections.push(Section::chart(
            "weekday",
            "Sales by Day of Week",
            ChartSpec::new(ChartKind::HorizontalBar, "DAY_OF_WEEK", &["REVENUE"]).color("REVENUE"),
            weekday_table,
        ));

        sections.push(Section::chart(
            "categories",
            "Top 10 Categories by Revenue",
            ChartSpec::new(ChartKind::HorizontalBar, "CATEGORY", &["REVENUE"]).color("REVENUE"),
            data.categories,
        ));
        sections.push(Section::chart(
            "brands",
            "Top 10 Brands by Revenue",
            ChartSpec::new(ChartKind::Donut, "BRAND", &["REVENUE"]),
            data.brands,
        ));
        sections.push(Section::table(
            "top-products",
            "Top Performing Products",
            data.products,
        ));

        let merchants: Vec<MerchantRow> = decode(&data.merchants, "sales_merchants");
        sections.push(Section::chart(
            "merchants",
            "Merchant Revenue Performance",
            ChartSpec::new(ChartKind::Bar, "THIRD_PARTY_MERCHANT_NAME", &["REVENUE"]).color("AOV"),
            data.merchants.clone(),
        ));
        if let Some(top) = merchants.first() {
            sections.push(Section::kpis(
                "top-merchant",
                "Top Merchant",
                vec![
                    Kpi::text("Merchant", top.third_party_merchant_name.clone()),
                    Kpi::currency("Revenue", top.revenue.unwrap_or(0.0)),
                    Kpi::count("Orders", top.orders.unwrap_or(0.0)),
                    Kpi::currency("AOV", top.aov.unwrap_or(0.0)),
                    Kpi::percent("Discount Rate", top.discount_rate.unwrap_or(0.0)),
                ],
            ));
        }
        sections.push(Section::table(
            "merchant-breakdown",
            "Detailed Merchant Breakdown",
            data.merchants,
        ));

        sections
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;

    use super::*;
    use crate::{
        limits::RowLimits,
        metrics::Growth,
        models::{Delta, SectionBody},
        pipeline::render,
        warehouse::fake::FakeWarehouse,
    };

    fn kpi_table(revenue: f64, prev_revenue: f64) -> Table {
        Table::new(
            [
                "TOTAL_REVENUE",
                "TOTAL_ORDERS",
                "UNIQUE_CUSTOMERS",
                "AVG_ORDER_VALUE",
                "UNITS_SOLD",
                "TOTAL_DISCOUNTS",
                "PREV_REVENUE",
                "PREV_ORDERS",
                "PREV_AOV",
                "PREV_CUSTOMERS",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            vec![vec![
                json!(revenue),
                json!(10),
                json!(5),
                json!(120.0),
                json!(30),
                json!(50.0),
                json!(prev_revenue),
                json!(8),
                json!(0),
                json!(4),
            ]],
        )
    }

    fn trend_table(days: u32) -> Table {
        Table::new(
            vec![
                "SALE_DATE".into(),
                "DAILY_REVENUE".into(),
                "DAILY_ORDERS".into(),
                "AVG_ORDER_VALUE".into(),
            ],
            (1..=days)
                .map(|d| {
                    vec![
                        json!(format!("2024-01-{d:02}")),
                        json!(100.0 * f64::from(d)),
                        json!(d),
                        json!(100.0),
                    ]
                })
                .collect(),
        )
    }

    fn filters() -> SalesFilters {
        SalesFilters {
            start: NaiveDate::from_ymd_opt(2024, 1, 8),
            end: NaiveDate::from_ymd_opt(2024, 1, 15),
            brand: Some("Acme".into()),
            merchant: Some("All".into()),
        }
    }

    async fn render_with(fake: FakeWarehouse) -> (Arc<FakeWarehouse>, Vec<Section>) {
        let fake = Arc::new(fake);
        let queries = QueryService::new(fake.clone(), Duration::from_secs(60), 64);
        let page = render(&SalesView, &queries, &RowLimits::default(), filters())
            .await
            .expect("render");
        (fake, page.sections)
    }

    fn section<'a>(sections: &'a [Section], id: &str) -> &'a Section {
        sections.iter().find(|s| s.id == id).expect("section present")
    }

    #[tokio::test]
    async fn revenue_growth_compares_equal_windows() {
        let (fake, sections) = render_with(
            FakeWarehouse::new()
                .respond("CurrentPeriod", kpi_table(1_200.0, 1_000.0))
                .respond("GROUP BY s.SALE_DATE", trend_table(9)),
        )
        .await;

        let SectionBody::Kpis { items } = &section(&sections, "kpis").body else {
            panic!("kpis expected");
        };
        assert_eq!(items[0].delta, Some(Delta::Growth(Growth::Percent(20.0))));
        // Prior AOV of zero has no growth.
        assert_eq!(items[2].delta, Some(Delta::Growth(Growth::NotApplicable)));
        assert_eq!(items[1].delta, Some(Delta::Change(2.0)));

        let executed = fake.executed.lock().expect("lock");
        let (_, params) = executed
            .iter()
            .find(|(sql, _)| sql.contains("CurrentPeriod"))
            .expect("kpi query");
        assert_eq!(params[0], SqlParam::from(NaiveDate::from_ymd_opt(2024, 1, 8).expect("date")));
        assert_eq!(params[2], SqlParam::from("Acme"));
        assert_eq!(params[3], SqlParam::from(NaiveDate::from_ymd_opt(2024, 1, 1).expect("date")));
        assert_eq!(params.len(), 6);
    }

    #[tokio::test]
    async fn trend_carries_nulls_before_a_full_week() {
        let (_, sections) = render_with(
            FakeWarehouse::new().respond("GROUP BY s.SALE_DATE", trend_table(9)),
        )
        .await;

        let rows = section(&sections, "trend").rows().expect("rows");
        assert_eq!(rows.cell(5, "MA7_REVENUE"), Some(&serde_json::Value::Null));
        assert_eq!(rows.cell(6, "MA7_REVENUE"), Some(&json!(400.0)));

        let weekdays = section(&sections, "weekday").rows().expect("rows");
        assert_eq!(weekdays.cell(0, "DAY_OF_WEEK"), Some(&json!("Monday")));
        // Jan 1 and Jan 8 2024 were Mondays.
        assert_eq!(weekdays.cell(0, "REVENUE"), Some(&json!(900.0)));
    }

    #[tokio::test]
    async fn long_trends_keep_every_day() {
        let first = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let days = Table::new(
            vec![
                "SALE_DATE".into(),
                "DAILY_REVENUE".into(),
                "DAILY_ORDERS".into(),
                "AVG_ORDER_VALUE".into(),
            ],
            (0..200)
                .map(|offset| {
                    let day = first + chrono::Duration::days(offset);
                    vec![json!(day.to_string()), json!(50.0), json!(2), json!(25.0)]
                })
                .collect(),
        );
        let (_, sections) = render_with(FakeWarehouse::new().respond("GROUP BY s.SALE_DATE", days)).await;

        let rows = section(&sections, "trend").rows().expect("rows");
        assert_eq!(rows.len(), 200);
        assert_eq!(rows.cell(199, "SALE_DATE"), Some(&json!("2024-07-18")));
    }

    #[tokio::test]
    async fn missing_sales_render_no_data() {
        let (_, sections) = render_with(FakeWarehouse::new()).await;
        assert!(matches!(section(&sections, "kpis").body, SectionBody::Empty { .. }));
        assert!(matches!(section(&sections, "trend").body, SectionBody::Empty { .. }));
        assert!(sections.iter().all(|s| s.id != "top-merchant"));
    }

    #[test]
    fn reversed_window_is_rejected() {
        let reversed = SalesFilters {
            start: NaiveDate::from_ymd_opt(2024, 2, 1),
            end: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..SalesFilters::default()
        };
        assert!(SalesView.validate(&reversed).is_err());
    }
}
