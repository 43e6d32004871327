//! Remote Athena implementation of the query contract.
//!
//! Functionally equivalent to the DuckDB backend with one sanctioned
//! divergence: medians are `approx_percentile(.., 0.5)` since Athena
//! has no exact median at scale. Queries run against the externally
//! provisioned `whisky_stocks_view`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use aws_sdk_athena::Client;
use chrono::NaiveDate;
use tokio::time::Instant;
use tracing::debug;

use dram_core::{
    AthenaConfig, CodeStockStats, DailyStockStats, DiscountRow, Error, PriceRow, Result,
    UnitsSoldRow,
};

use crate::backend::StockQueries;
use crate::export::write_sales_csv;

/// One Athena result row: VARCHAR cells, null-preserving.
type RawRow = Vec<Option<String>>;

/// Queries against the remote managed columnar service.
pub struct AthenaQueries {
    client: Client,
    database: String,
    output_location: String,
    poll_interval: Duration,
    timeout: Duration,
    sales_dir: Option<PathBuf>,
}

impl AthenaQueries {
    pub fn new(client: Client, config: &AthenaConfig, sales_dir: Option<PathBuf>) -> Self {
        Self {
            client,
            database: config.database.clone(),
            output_location: config.output_location.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            sales_dir,
        }
    }

    /// Construct a backend from ambient AWS credentials/region.
    pub async fn from_env(config: &AthenaConfig, sales_dir: Option<PathBuf>) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        Self::new(Client::new(&sdk_config), config, sales_dir)
    }

    /// Start a query, poll it to completion under the timeout ceiling,
    /// and fetch all result pages with the header row stripped.
    async fn run_query(&self, sql: &str, parameters: Vec<String>) -> Result<Vec<RawRow>> {
        let mut start = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(
                QueryExecutionContext::builder().database(&self.database).build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(&self.output_location)
                    .build(),
            );
        if !parameters.is_empty() {
            start = start.set_execution_parameters(Some(parameters));
        }
        let started = start
            .send()
            .await
            .map_err(|e| Error::database(format!("start_query_execution: {e}")))?;
        let query_id = started
            .query_execution_id()
            .ok_or_else(|| Error::database("Athena returned no query execution id"))?
            .to_string();
        debug!(query_id, "athena query started");

        self.wait_for_query(&query_id).await?;
        self.fetch_results(&query_id).await
    }

    async fn wait_for_query(&self, query_id: &str) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let execution = self
                .client
                .get_query_execution()
                .query_execution_id(query_id)
                .send()
                .await
                .map_err(|e| Error::query_failed(query_id, e.to_string()))?;
            let status = execution
                .query_execution()
                .and_then(|q| q.status())
                .ok_or_else(|| Error::query_failed(query_id, "no status in response"))?;

            match status.state() {
                Some(&QueryExecutionState::Succeeded) => return Ok(()),
                Some(&QueryExecutionState::Failed) | Some(&QueryExecutionState::Cancelled) => {
                    let reason = status
                        .state_change_reason()
                        .unwrap_or("unknown reason")
                        .to_string();
                    return Err(Error::query_failed(query_id, reason));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(Error::query_timeout(query_id, self.timeout.as_secs()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_results(&self, query_id: &str) -> Result<Vec<RawRow>> {
        let mut rows: Vec<RawRow> = Vec::new();
        let mut columns: Option<Vec<String>> = None;
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get_query_results()
                .query_execution_id(query_id);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let page = request
                .send()
                .await
                .map_err(|e| Error::query_failed(query_id, e.to_string()))?;

            if let Some(result_set) = page.result_set() {
                if columns.is_none() {
                    columns = result_set.result_set_metadata().map(|md| {
                        md.column_info().iter().map(|c| c.name().to_string()).collect()
                    });
                }
                for row in result_set.rows() {
                    rows.push(
                        row.data()
                            .iter()
                            .map(|datum| datum.var_char_value().map(str::to_string))
                            .collect(),
                    );
                }
            }

            next_token = page.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        Ok(strip_header_row(rows, columns.as_deref()))
    }
}

/// Athena serves the CSV header back as the first data row; drop it
/// when it matches the column names.
fn strip_header_row(mut rows: Vec<RawRow>, columns: Option<&[String]>) -> Vec<RawRow> {
    if let (Some(first), Some(columns)) = (rows.first(), columns) {
        let is_header = first.len() == columns.len()
            && first
                .iter()
                .zip(columns)
                .all(|(cell, name)| cell.as_deref() == Some(name.as_str()));
        if is_header {
            rows.remove(0);
        }
    }
    rows
}

/// Quote a string value as an Athena execution parameter.
///
/// Execution parameters are substituted verbatim into the query, so
/// string and date values carry their own literal syntax.
fn string_param(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a date value as an Athena execution parameter.
fn date_param(date: NaiveDate) -> String {
    format!("DATE '{}'", date.format("%Y-%m-%d"))
}

fn cell(row: &RawRow, index: usize) -> Option<&str> {
    row.get(index).and_then(|c| c.as_deref())
}

fn req_str(row: &RawRow, index: usize, query: &str) -> Result<String> {
    cell(row, index)
        .map(str::to_string)
        .ok_or_else(|| Error::parse(format!("{query}: null in required column {index}")))
}

fn opt_str(row: &RawRow, index: usize) -> Option<String> {
    cell(row, index).map(str::to_string)
}

/// Best-effort numeric coercion of a VARCHAR cell.
fn opt_f64(row: &RawRow, index: usize) -> Option<f64> {
    cell(row, index)?.trim().parse().ok()
}

fn req_f64(row: &RawRow, index: usize, query: &str) -> Result<f64> {
    opt_f64(row, index)
        .ok_or_else(|| Error::parse(format!("{query}: non-numeric cell in column {index}")))
}

fn req_i64(row: &RawRow, index: usize, query: &str) -> Result<i64> {
    cell(row, index)
        .and_then(|c| c.trim().parse().ok())
        .ok_or_else(|| Error::parse(format!("{query}: non-integer cell in column {index}")))
}

/// Parse a date cell, tolerating a trailing time component.
fn req_date(row: &RawRow, index: usize, query: &str) -> Result<NaiveDate> {
    let raw = cell(row, index)
        .ok_or_else(|| Error::parse(format!("{query}: null date in column {index}")))?;
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| Error::parse(format!("{query}: bad date '{raw}': {e}")))
}

#[async_trait]
impl StockQueries for AthenaQueries {
    async fn discounted_items(&mut self, as_of: NaiveDate) -> Result<Vec<DiscountRow>> {
        let rows = self
            .run_query(
                "WITH current_prices AS (
                     SELECT code,
                            MIN(title) AS title,
                            MIN(url) AS url,
                            MIN(CAST(price_gbp AS DOUBLE)) AS current_price
                     FROM whisky_stocks_view
                     WHERE CAST(import_date AS DATE) = ?
                     GROUP BY code
                 ),
                 historical_max AS (
                     SELECT code, MAX(CAST(price_gbp AS DOUBLE)) AS old_price
                     FROM whisky_stocks_view
                     GROUP BY code
                 )
                 SELECT c.code,
                        c.title,
                        c.url,
                        c.current_price,
                        m.old_price,
                        m.old_price - c.current_price AS discount,
                        ROUND((m.old_price - c.current_price) / NULLIF(m.old_price, 0) * 100, 4)
                            AS perc_saving
                 FROM current_prices c
                 JOIN historical_max m ON c.code = m.code
                 WHERE m.old_price > 0
                   AND m.old_price - c.current_price > 0
                 ORDER BY discount DESC",
                vec![date_param(as_of)],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DiscountRow {
                    import_date: as_of,
                    code: req_str(row, 0, "discounted_items")?,
                    title: req_str(row, 1, "discounted_items")?,
                    url: opt_str(row, 2),
                    current_price: req_f64(row, 3, "discounted_items")?,
                    old_price: req_f64(row, 4, "discounted_items")?,
                    discount: req_f64(row, 5, "discounted_items")?,
                    perc_saving: req_f64(row, 6, "discounted_items")?,
                })
            })
            .collect()
    }

    async fn stocks_and_median_values(&mut self) -> Result<Vec<DailyStockStats>> {
        let rows = self
            .run_query(
                "SELECT import_date,
                        COUNT(*) AS stock_count,
                        approx_percentile(CAST(price_gbp AS DOUBLE), 0.5) AS median_price,
                        SUM(CAST(availability AS DOUBLE)) AS total_availability
                 FROM whisky_stocks_view
                 WHERE import_date IS NOT NULL
                 GROUP BY import_date
                 ORDER BY import_date DESC",
                Vec::new(),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyStockStats {
                    import_date: req_date(row, 0, "stocks_and_median_values")?,
                    stock_count: req_i64(row, 1, "stocks_and_median_values")?,
                    median_price: opt_f64(row, 2),
                    total_availability: opt_f64(row, 3),
                })
            })
            .collect()
    }

    async fn stocks_and_median_by_code(
        &mut self,
        codes: &[String],
    ) -> Result<Vec<CodeStockStats>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; codes.len()].join(", ");
        let parameters = codes.iter().map(|code| string_param(code)).collect();
        let rows = self
            .run_query(
                &format!(
                    "WITH filtered AS (
                         SELECT import_date,
                                code,
                                approx_percentile(CAST(price_gbp AS DOUBLE), 0.5)
                                    AS median_price,
                                SUM(CAST(availability AS DOUBLE)) AS total_availability
                         FROM whisky_stocks_view
                         WHERE import_date IS NOT NULL
                           AND code IN ({placeholders})
                         GROUP BY import_date, code
                     ),
                     changes AS (
                         SELECT code, COUNT(DISTINCT median_price) AS price_changes_count
                         FROM filtered
                         GROUP BY code
                     )
                     SELECT f.import_date,
                            f.code,
                            f.median_price,
                            f.total_availability,
                            c.price_changes_count
                     FROM filtered f
                     INNER JOIN changes c ON f.code = c.code
                     ORDER BY f.import_date DESC, f.code"
                ),
                parameters,
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CodeStockStats {
                    import_date: req_date(row, 0, "stocks_and_median_by_code")?,
                    code: req_str(row, 1, "stocks_and_median_by_code")?,
                    median_price: opt_f64(row, 2),
                    total_availability: opt_f64(row, 3),
                    price_changes_count: req_i64(row, 4, "stocks_and_median_by_code")?,
                })
            })
            .collect()
    }

    async fn units_sold(&mut self, on: NaiveDate) -> Result<Vec<UnitsSoldRow>> {
        let previous = on - chrono::Duration::days(1);
        let rows = self
            .run_query(
                "WITH current_day AS (
                     SELECT code,
                            SUM(CAST(availability AS DOUBLE)) AS availability
                     FROM whisky_stocks_view
                     WHERE CAST(import_date AS DATE) = ?
                     GROUP BY code
                 ),
                 previous_day AS (
                     SELECT code,
                            MIN(title) AS title,
                            MIN(url) AS url,
                            MIN(CAST(price_gbp AS DOUBLE)) AS price_gbp,
                            SUM(CAST(availability AS DOUBLE)) AS availability
                     FROM whisky_stocks_view
                     WHERE CAST(import_date AS DATE) = ?
                     GROUP BY code
                 )
                 SELECT p.code,
                        p.title,
                        p.url,
                        p.price_gbp,
                        COALESCE(c.availability, 0) AS availability,
                        COALESCE(p.availability, 0) - COALESCE(c.availability, 0)
                            AS units_sold
                 FROM previous_day p
                 LEFT OUTER JOIN current_day c ON p.code = c.code
                 WHERE COALESCE(p.availability, 0) - COALESCE(c.availability, 0) > 0
                 ORDER BY p.price_gbp DESC",
                vec![date_param(on), date_param(previous)],
            )
            .await?;

        let result: Vec<UnitsSoldRow> = rows
            .iter()
            .map(|row| {
                Ok(UnitsSoldRow {
                    import_date: on,
                    code: req_str(row, 0, "units_sold")?,
                    title: req_str(row, 1, "units_sold")?,
                    url: opt_str(row, 2),
                    price_gbp: opt_f64(row, 3),
                    availability: req_f64(row, 4, "units_sold")?,
                    units_sold: req_f64(row, 5, "units_sold")?,
                })
            })
            .collect::<Result<_>>()?;

        if let Some(dir) = &self.sales_dir {
            write_sales_csv(&result, dir, on)?;
        }
        Ok(result)
    }

    async fn price_search(&mut self, as_of: NaiveDate) -> Result<Vec<PriceRow>> {
        let rows = self
            .run_query(
                "SELECT import_date, code, title, price_gbp, url
                 FROM whisky_stocks_view
                 WHERE CAST(import_date AS DATE) = ?",
                vec![date_param(as_of)],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(PriceRow {
                    import_date: req_date(row, 0, "price_search")?,
                    code: req_str(row, 1, "price_search")?,
                    title: req_str(row, 2, "price_search")?,
                    price_gbp: opt_f64(row, 3),
                    url: opt_str(row, 4),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(cells: &[Option<&str>]) -> RawRow {
        cells.iter().map(|c| c.map(str::to_string)).collect()
    }

    #[test]
    fn test_string_param_escapes_quotes() {
        assert_eq!(string_param("HED1"), "'HED1'");
        assert_eq!(string_param("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_date_param_literal() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(date_param(date), "DATE '2024-01-02'");
    }

    #[test]
    fn test_strip_header_row_only_when_matching() {
        let columns = vec!["code".to_string(), "price_gbp".to_string()];
        let with_header = vec![
            raw(&[Some("code"), Some("price_gbp")]),
            raw(&[Some("HED1"), Some("80.0")]),
        ];
        let stripped = strip_header_row(with_header, Some(&columns));
        assert_eq!(stripped.len(), 1);
        assert_eq!(cell(&stripped[0], 0), Some("HED1"));

        let without_header = vec![raw(&[Some("HED1"), Some("80.0")])];
        assert_eq!(strip_header_row(without_header, Some(&columns)).len(), 1);
    }

    #[test]
    fn test_numeric_and_date_cell_parsing() {
        let row = raw(&[Some("2024-01-02 00:00:00"), Some(" 42 "), Some("n/a"), None]);
        assert_eq!(
            req_date(&row, 0, "t").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(opt_f64(&row, 1), Some(42.0));
        assert_eq!(opt_f64(&row, 2), None);
        assert_eq!(opt_f64(&row, 3), None);
        assert!(req_f64(&row, 2, "t").is_err());
        assert!(req_str(&row, 3, "t").is_err());
    }
}
