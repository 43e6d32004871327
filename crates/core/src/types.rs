//! Core data types for the dramline stock analytics system.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical column set of the history table, in table order.
///
/// Dynamic column lists anywhere in the system must be drawn from this
/// allow-list, never from external input.
pub const CANONICAL_COLUMNS: [&str; 14] = [
    "abv",
    "availability",
    "code",
    "country",
    "type",
    "url",
    "price_gbp",
    "price_ex_vat",
    "price_incl_vat",
    "size",
    "style",
    "title",
    "vintage",
    "import_date",
];

/// One catalog item's price/availability facts for a single calendar day.
///
/// `(code, import_date)` is the natural key of the history table, but
/// duplicates within a day are tolerated; queries aggregate rather than
/// assume uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    /// Catalog item identifier. Not globally unique across reissues.
    pub code: String,
    /// Item title, whitespace-trimmed.
    pub title: String,
    /// Alcohol by volume, if the snapshot epoch carried it.
    pub abv: Option<f64>,
    /// Headline GBP price. May be absent in epochs that only report
    /// VAT-split prices; the store view backfills from `price_incl_vat`.
    pub price_gbp: Option<f64>,
    /// Price excluding VAT.
    pub price_ex_vat: Option<f64>,
    /// Price including VAT.
    pub price_incl_vat: Option<f64>,
    /// Units available. Numeric in every known epoch, but cast best-effort.
    pub availability: Option<f64>,
    /// Country of origin.
    pub country: Option<String>,
    /// Product category (e.g. "Whisky"). Source column `Group`/`type`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Bottle size.
    pub size: Option<String>,
    /// Style/sub-category.
    pub style: Option<String>,
    /// Vintage year, kept as text (source data mixes years and "NV").
    pub vintage: Option<String>,
    /// Product page URL.
    pub url: Option<String>,
    /// Snapshot day, derived from the source file name, never from a
    /// data column. None when the file name carried no date token.
    pub import_date: Option<NaiveDate>,
}

/// One discounted item: current price vs. all-time historical maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRow {
    pub import_date: NaiveDate,
    pub code: String,
    pub title: String,
    pub url: Option<String>,
    pub current_price: f64,
    /// All-time historical maximum price for this code.
    pub old_price: f64,
    /// `old_price - current_price`, strictly positive.
    pub discount: f64,
    /// Percentage saving, rounded to 4 decimal places.
    pub perc_saving: f64,
}

/// Per-day stock count and price statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStockStats {
    pub import_date: NaiveDate,
    pub stock_count: i64,
    /// Exact median on the embedded backend; approximate percentile on
    /// the remote columnar backend.
    pub median_price: Option<f64>,
    pub total_availability: Option<f64>,
}

/// Per-day, per-code stock statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeStockStats {
    pub import_date: NaiveDate,
    pub code: String,
    pub median_price: Option<f64>,
    pub total_availability: Option<f64>,
    /// Distinct daily median prices seen for this code across its whole
    /// history; a proxy for how many times its price has changed.
    pub price_changes_count: i64,
}

/// Inferred day-over-day sale of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitsSoldRow {
    pub import_date: NaiveDate,
    pub code: String,
    pub title: String,
    pub url: Option<String>,
    pub price_gbp: Option<f64>,
    /// Availability on the query day; 0 when the code vanished entirely.
    pub availability: f64,
    /// Previous-day availability minus current, strictly positive.
    pub units_sold: f64,
}

/// One row of the "today" slice, as consumed by the price search UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub import_date: NaiveDate,
    pub code: String,
    pub title: String,
    pub price_gbp: Option<f64>,
    pub url: Option<String>,
}
