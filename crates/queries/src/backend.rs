//! Backend-agnostic query contract.

use async_trait::async_trait;
use chrono::NaiveDate;

use dram_core::{
    CodeStockStats, DailyStockStats, DiscountRow, PriceRow, Result, UnitsSoldRow,
};

/// Read-only analytical queries over the stock history.
///
/// Two interchangeable implementations exist: the embedded DuckDB store
/// and the remote Athena service. Both must produce the same result
/// schemas and semantics; the only sanctioned divergence is the median,
/// which is exact on DuckDB and an approximate percentile on Athena.
///
/// All queries are pure reads except [`units_sold`], which also writes
/// a dated sales CSV when an output directory is configured (overwrite
/// on rerun, so idempotent for a given date).
///
/// [`units_sold`]: StockQueries::units_sold
#[async_trait]
pub trait StockQueries: Send {
    /// Items cheaper today than their all-time historical maximum.
    ///
    /// `old_price` is the maximum `price_gbp` across the entire history
    /// for the code, not just the previous day. Rows with a zero or
    /// null historical maximum are excluded rather than dividing by
    /// zero. Ordered by `discount` descending.
    async fn discounted_items(&mut self, as_of: NaiveDate) -> Result<Vec<DiscountRow>>;

    /// Per-day stock count, median price and total availability,
    /// newest day first.
    async fn stocks_and_median_values(&mut self) -> Result<Vec<DailyStockStats>>;

    /// Same statistics grouped by code, plus the count of distinct
    /// daily medians per code. An empty `codes` filter yields an empty
    /// result.
    async fn stocks_and_median_by_code(&mut self, codes: &[String])
        -> Result<Vec<CodeStockStats>>;

    /// Day-over-day availability decreases, interpreted as units sold.
    ///
    /// Joins `on` against the previous day; a code that vanished
    /// entirely counts as current availability 0, so a full sell-through
    /// is captured. Only strictly positive deltas are returned.
    async fn units_sold(&mut self, on: NaiveDate) -> Result<Vec<UnitsSoldRow>>;

    /// The unfiltered day slice; price/title filtering is left to the
    /// consumer.
    async fn price_search(&mut self, as_of: NaiveDate) -> Result<Vec<PriceRow>>;
}
