//! Raw sales data handling: CSV ingestion, store-to-product aggregation,
//! gap-filling and per-SKU slices.

use crate::error::{DemandError, Result};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// One raw per-store-per-day sales observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub product_id: String,
    pub store_id: String,
    pub units_sold: f64,
    pub price: f64,
    pub discount: f64,
    pub competitor_price: f64,
    pub holiday_flag: f64,
    pub inventory_level: f64,
}

/// Immutable dataset context. Loaded once, then passed by reference into the
/// trainer, forecaster and reorder-point engine.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<SalesRecord>,
}

/// Loader for raw sales data
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load raw sales records from a CSV file.
    ///
    /// Column names are matched tolerantly: headers are lowercased with
    /// spaces and slashes mapped to underscores, so "Units Sold",
    /// "Holiday/Promotion" and "Competitor Pricing" all resolve.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DemandError::DataUnavailable(format!(
                "data file '{}' not found",
                path.display()
            )));
        }
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(df)
    }

    /// Build a dataset from an existing DataFrame
    pub fn from_dataframe(df: DataFrame) -> Result<Dataset> {
        let dates = column_as_dates(&df, &find_column(&df, &["date"])?)?;
        let products = column_as_strings(&df, &find_column(&df, &["product_id", "product"])?)?;
        let stores = column_as_strings(&df, &find_column(&df, &["store_id", "store"])?)?;
        let units = column_as_f64(&df, &find_column(&df, &["units_sold"])?)?;
        let prices = column_as_f64(&df, &find_column(&df, &["price"])?)?;
        let discounts = column_as_f64(&df, &find_column(&df, &["discount"])?)?;
        let competitor =
            column_as_f64(&df, &find_column(&df, &["competitor_pricing", "competitor"])?)?;
        let holidays = column_as_f64(&df, &find_column(&df, &["holiday_promotion", "holiday"])?)?;
        let inventory =
            column_as_f64(&df, &find_column(&df, &["inventory_level", "inventory"])?)?;

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            // Rows with unparseable dates or missing demand are dropped,
            // mirroring the ingestion layer's dropna on units sold.
            let (date, units_sold) = match (dates[i], units[i]) {
                (Some(d), Some(u)) => (d, u),
                _ => continue,
            };
            records.push(SalesRecord {
                date,
                product_id: products[i].clone().unwrap_or_default(),
                store_id: stores[i].clone().unwrap_or_default(),
                units_sold,
                price: prices[i].unwrap_or(0.0),
                discount: discounts[i].unwrap_or(0.0),
                competitor_price: competitor[i].unwrap_or(0.0),
                holiday_flag: holidays[i].unwrap_or(0.0),
                inventory_level: inventory[i].unwrap_or(0.0),
            });
        }

        Dataset::from_records(records)
    }
}

impl Dataset {
    /// Create a dataset from in-memory records (also used by tests)
    pub fn from_records(mut records: Vec<SalesRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(DemandError::DataUnavailable(
                "no sales records in source".to_string(),
            ));
        }
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(Self { records })
    }

    /// All raw records, date-ordered
    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    /// Distinct product identifiers, sorted
    pub fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .iter()
            .map(|r| r.product_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Distinct (product, store) pairs, sorted
    pub fn sku_ids(&self) -> Vec<(String, String)> {
        let mut ids: Vec<(String, String)> = self
            .records
            .iter()
            .map(|r| (r.product_id.clone(), r.store_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Collapse store-level records to product-level daily series:
    /// demand summed, price/discount/competitor averaged, holiday flag maxed.
    pub fn aggregate(&self) -> AggregatedData {
        struct Acc {
            units: f64,
            price_sum: f64,
            discount_sum: f64,
            competitor_sum: f64,
            holiday: f64,
            count: f64,
        }

        let mut groups: BTreeMap<String, BTreeMap<NaiveDate, Acc>> = BTreeMap::new();
        for r in &self.records {
            let acc = groups
                .entry(r.product_id.clone())
                .or_default()
                .entry(r.date)
                .or_insert(Acc {
                    units: 0.0,
                    price_sum: 0.0,
                    discount_sum: 0.0,
                    competitor_sum: 0.0,
                    holiday: 0.0,
                    count: 0.0,
                });
            acc.units += r.units_sold;
            acc.price_sum += r.price;
            acc.discount_sum += r.discount;
            acc.competitor_sum += r.competitor_price;
            acc.holiday = acc.holiday.max(r.holiday_flag);
            acc.count += 1.0;
        }

        let mut products = BTreeMap::new();
        for (product_id, days) in groups {
            let rows: Vec<AggregatedRecord> = days
                .into_iter()
                .map(|(date, acc)| AggregatedRecord {
                    date,
                    units_sold: acc.units,
                    price: acc.price_sum / acc.count,
                    discount: acc.discount_sum / acc.count,
                    competitor_price: acc.competitor_sum / acc.count,
                    holiday_flag: acc.holiday,
                })
                .collect();
            let history = ProductHistory::gap_filled(product_id.clone(), rows);
            products.insert(product_id, history);
        }

        AggregatedData { products }
    }

    /// Daily units-sold history plus latest inventory level for one
    /// (product, store) pair.
    pub fn sku_history(&self, product_id: &str, store_id: &str) -> Result<SkuHistory> {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut latest: Option<(NaiveDate, f64)> = None;

        for r in &self.records {
            if r.product_id != product_id || r.store_id != store_id {
                continue;
            }
            *by_date.entry(r.date).or_insert(0.0) += r.units_sold;
            if latest.map_or(true, |(d, _)| r.date >= d) {
                latest = Some((r.date, r.inventory_level));
            }
        }

        let (last_date, inventory_level) = latest.ok_or_else(|| {
            DemandError::DataUnavailable(format!(
                "no data found for {} at {}",
                product_id, store_id
            ))
        })?;

        Ok(SkuHistory {
            product_id: product_id.to_string(),
            store_id: store_id.to_string(),
            observations: by_date.into_iter().collect(),
            inventory_level,
            last_date,
        })
    }
}

/// One product-level daily row after aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    pub date: NaiveDate,
    pub units_sold: f64,
    pub price: f64,
    pub discount: f64,
    pub competitor_price: f64,
    pub holiday_flag: f64,
}

/// Product-level daily histories keyed by product id
#[derive(Debug, Clone)]
pub struct AggregatedData {
    products: BTreeMap<String, ProductHistory>,
}

impl AggregatedData {
    pub fn product(&self, product_id: &str) -> Option<&ProductHistory> {
        self.products.get(product_id)
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &String> {
        self.products.keys()
    }

    pub fn histories(&self) -> impl Iterator<Item = &ProductHistory> {
        self.products.values()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// A single product's contiguous daily aggregated series
#[derive(Debug, Clone)]
pub struct ProductHistory {
    product_id: String,
    rows: Vec<AggregatedRecord>,
}

impl ProductHistory {
    /// Build a contiguous daily series from (possibly sparse) aggregated
    /// rows: missing sales days become zero demand, the remaining drivers
    /// are forward-filled from the prior known day.
    pub fn gap_filled(product_id: String, mut rows: Vec<AggregatedRecord>) -> Self {
        rows.sort_by(|a, b| a.date.cmp(&b.date));
        let mut filled = Vec::with_capacity(rows.len());
        let mut prev: Option<AggregatedRecord> = None;

        for row in rows {
            if let Some(p) = &prev {
                let mut date = p.date + Duration::days(1);
                while date < row.date {
                    filled.push(AggregatedRecord {
                        date,
                        units_sold: 0.0,
                        price: p.price,
                        discount: p.discount,
                        competitor_price: p.competitor_price,
                        holiday_flag: p.holiday_flag,
                    });
                    date += Duration::days(1);
                }
            }
            prev = Some(row.clone());
            filled.push(row);
        }

        Self {
            product_id,
            rows: filled,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn rows(&self) -> &[AggregatedRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn units_sold(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.units_sold).collect()
    }

    /// Last known values and trailing 30-day means, used to seed synthetic
    /// future rows when forecasting.
    pub fn last_values(&self) -> Option<LastKnownValues> {
        let last = self.rows.last()?;
        let tail = &self.rows[self.rows.len().saturating_sub(30)..];
        let n = tail.len() as f64;
        Some(LastKnownValues {
            last_date: last.date,
            last_holiday: last.holiday_flag,
            avg_price_30d: tail.iter().map(|r| r.price).sum::<f64>() / n,
            avg_discount_30d: tail.iter().map(|r| r.discount).sum::<f64>() / n,
            avg_competitor_30d: tail.iter().map(|r| r.competitor_price).sum::<f64>() / n,
        })
    }
}

/// Seed values for synthetic future feature rows
#[derive(Debug, Clone, Copy)]
pub struct LastKnownValues {
    pub last_date: NaiveDate,
    pub last_holiday: f64,
    pub avg_price_30d: f64,
    pub avg_discount_30d: f64,
    pub avg_competitor_30d: f64,
}

/// Daily units-sold history for one (product, store) pair plus the latest
/// recorded inventory level. Recomputed per request, never persisted.
#[derive(Debug, Clone)]
pub struct SkuHistory {
    pub product_id: String,
    pub store_id: String,
    /// Observed (date, units) pairs, date-ordered; gaps not filled
    pub observations: Vec<(NaiveDate, f64)>,
    pub inventory_level: f64,
    pub last_date: NaiveDate,
}

impl SkuHistory {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn units(&self) -> Vec<f64> {
        self.observations.iter().map(|(_, u)| *u).collect()
    }

    /// Contiguous daily series with missing days filled as zero demand,
    /// for model fitting.
    pub fn daily_series(&self) -> (Vec<NaiveDate>, Vec<f64>) {
        let mut dates = Vec::new();
        let mut units = Vec::new();
        let mut prev: Option<NaiveDate> = None;

        for &(date, u) in &self.observations {
            if let Some(p) = prev {
                let mut d = p + Duration::days(1);
                while d < date {
                    dates.push(d);
                    units.push(0.0);
                    d += Duration::days(1);
                }
            }
            dates.push(date);
            units.push(u);
            prev = Some(date);
        }

        (dates, units)
    }
}

/// Header normalization: lowercase, spaces/slashes/hyphens to underscores
fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '-' { '_' } else { c })
        .collect()
}

/// Find a column whose normalized name matches (exactly, then by prefix
/// containment) one of the given candidates.
fn find_column(df: &DataFrame, candidates: &[&str]) -> Result<String> {
    let names = df.get_column_names();

    for cand in candidates {
        for name in &names {
            if normalize_name(name) == *cand {
                return Ok(name.to_string());
            }
        }
    }
    for cand in candidates {
        for name in &names {
            if normalize_name(name).contains(cand) {
                return Ok(name.to_string());
            }
        }
    }

    Err(DemandError::DataUnavailable(format!(
        "no column matching '{}' found in data",
        candidates.join("' or '")
    )))
}

fn column_as_f64(df: &DataFrame, column_name: &str) -> Result<Vec<Option<f64>>> {
    let col = df.column(column_name).map_err(|e| {
        DemandError::DataUnavailable(format!("column '{}' not found: {}", column_name, e))
    })?;

    match col.dtype() {
        DataType::Float64 => Ok(col.f64().unwrap().into_iter().collect()),
        DataType::Float32 => Ok(col
            .f32()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|v| v as f64))
            .collect()),
        DataType::Int64 => Ok(col
            .i64()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|v| v as f64))
            .collect()),
        DataType::Int32 => Ok(col
            .i32()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|v| v as f64))
            .collect()),
        DataType::UInt64 => Ok(col
            .u64()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|v| v as f64))
            .collect()),
        DataType::UInt32 => Ok(col
            .u32()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|v| v as f64))
            .collect()),
        _ => Err(DemandError::DataUnavailable(format!(
            "column '{}' cannot be converted to f64",
            column_name
        ))),
    }
}

fn column_as_strings(df: &DataFrame, column_name: &str) -> Result<Vec<Option<String>>> {
    let col = df.column(column_name).map_err(|e| {
        DemandError::DataUnavailable(format!("column '{}' not found: {}", column_name, e))
    })?;

    match col.dtype() {
        DataType::Utf8 => Ok(col
            .utf8()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect()),
        _ => Ok((0..col.len())
            .map(|i| col.get(i).ok().map(|v| v.to_string()))
            .collect()),
    }
}

fn column_as_dates(df: &DataFrame, column_name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let col = df.column(column_name).map_err(|e| {
        DemandError::DataUnavailable(format!("column '{}' not found: {}", column_name, e))
    })?;

    match col.dtype() {
        DataType::Utf8 => Ok(col
            .utf8()
            .unwrap()
            .into_iter()
            .map(|v| v.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
            .collect()),
        DataType::Date => Ok(col
            .date()
            .unwrap()
            .into_iter()
            .map(|v| {
                // Signed days since the Unix epoch; pre-1970 dates are valid
                v.and_then(|days| {
                    NaiveDate::from_ymd_opt(1970, 1, 1)
                        .unwrap()
                        .checked_add_signed(Duration::days(days as i64))
                })
            })
            .collect()),
        _ => Err(DemandError::DataUnavailable(format!(
            "column '{}' cannot be parsed as dates",
            column_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, product: &str, store: &str, units: f64) -> SalesRecord {
        SalesRecord {
            date: date.parse().unwrap(),
            product_id: product.to_string(),
            store_id: store.to_string(),
            units_sold: units,
            price: 10.0,
            discount: 0.0,
            competitor_price: 10.0,
            holiday_flag: 0.0,
            inventory_level: 50.0,
        }
    }

    #[test]
    fn aggregation_sums_demand_across_stores() {
        let dataset = Dataset::from_records(vec![
            record("2023-01-01", "P1", "S1", 40.0),
            record("2023-01-01", "P1", "S2", 60.0),
            record("2023-01-02", "P1", "S1", 30.0),
        ])
        .unwrap();

        let agg = dataset.aggregate();
        let history = agg.product("P1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.rows()[0].units_sold, 100.0);
        assert_eq!(history.rows()[1].units_sold, 30.0);
    }

    #[test]
    fn aggregation_averages_prices_and_maxes_holiday() {
        let mut a = record("2023-01-01", "P1", "S1", 10.0);
        a.price = 8.0;
        a.holiday_flag = 0.0;
        let mut b = record("2023-01-01", "P1", "S2", 10.0);
        b.price = 12.0;
        b.holiday_flag = 1.0;

        let dataset = Dataset::from_records(vec![a, b]).unwrap();
        let agg = dataset.aggregate();
        let row = &agg.product("P1").unwrap().rows()[0];
        assert_eq!(row.price, 10.0);
        assert_eq!(row.holiday_flag, 1.0);
    }

    #[test]
    fn gap_fill_inserts_zero_demand_days_and_forward_fills_drivers() {
        let mut early = record("2023-01-01", "P1", "S1", 20.0);
        early.price = 9.0;
        let late = record("2023-01-04", "P1", "S1", 25.0);

        let dataset = Dataset::from_records(vec![early, late]).unwrap();
        let agg = dataset.aggregate();
        let history = agg.product("P1").unwrap();

        assert_eq!(history.len(), 4);
        assert_eq!(history.rows()[1].units_sold, 0.0);
        assert_eq!(history.rows()[1].price, 9.0);
        assert_eq!(history.rows()[2].units_sold, 0.0);
        assert_eq!(history.rows()[3].units_sold, 25.0);
    }

    #[test]
    fn sku_history_tracks_latest_inventory() {
        let mut a = record("2023-01-01", "P1", "S1", 5.0);
        a.inventory_level = 80.0;
        let mut b = record("2023-01-03", "P1", "S1", 7.0);
        b.inventory_level = 60.0;

        let dataset = Dataset::from_records(vec![a, b]).unwrap();
        let sku = dataset.sku_history("P1", "S1").unwrap();
        assert_eq!(sku.inventory_level, 60.0);
        assert_eq!(sku.len(), 2);

        let (dates, units) = sku.daily_series();
        assert_eq!(dates.len(), 3);
        assert_eq!(units, vec![5.0, 0.0, 7.0]);
    }

    #[test]
    fn missing_sku_reports_data_unavailable() {
        let dataset = Dataset::from_records(vec![record("2023-01-01", "P1", "S1", 5.0)]).unwrap();
        let err = dataset.sku_history("P9", "S1").unwrap_err();
        assert!(matches!(err, DemandError::DataUnavailable(_)));
    }

    #[test]
    fn date_dtype_parses_pre_epoch_days() {
        let series = Series::new("date", vec![-1i32, 0, 19_000])
            .cast(&DataType::Date)
            .unwrap();
        let df = DataFrame::new(vec![series]).unwrap();

        let dates = column_as_dates(&df, "date").unwrap();
        assert_eq!(dates[0], Some("1969-12-31".parse().unwrap()));
        assert_eq!(dates[1], Some("1970-01-01".parse().unwrap()));
        assert_eq!(dates[2], Some("2022-01-08".parse().unwrap()));
    }

    #[test]
    fn column_names_normalize() {
        assert_eq!(normalize_name("Holiday/Promotion"), "holiday_promotion");
        assert_eq!(normalize_name("Units Sold"), "units_sold");
        assert_eq!(normalize_name("Competitor Pricing"), "competitor_pricing");
    }
}
