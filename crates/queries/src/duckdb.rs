//! Embedded DuckDB implementation of the query contract.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use ::duckdb::{params, params_from_iter, Connection};

use dram_core::{
    CodeStockStats, DailyStockStats, DiscountRow, Error, PriceRow, Result, UnitsSoldRow,
};

use crate::backend::StockQueries;
use crate::export::write_sales_csv;

/// Queries against the embedded single-file store.
///
/// Holds its own connection (cloned from the store's database instance
/// by the caller) so query consumers never share the rebuild writer.
pub struct DuckDbQueries {
    conn: Connection,
    /// Output directory for the units-sold export; None disables it.
    sales_dir: Option<PathBuf>,
}

impl DuckDbQueries {
    pub fn new(conn: Connection, sales_dir: Option<PathBuf>) -> Self {
        Self { conn, sales_dir }
    }
}

fn db_err(e: ::duckdb::Error) -> Error {
    Error::database(e.to_string())
}

#[async_trait]
impl StockQueries for DuckDbQueries {
    async fn discounted_items(&mut self, as_of: NaiveDate) -> Result<Vec<DiscountRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "WITH current_prices AS (
                     SELECT code,
                            MIN(title) AS title,
                            MIN(url) AS url,
                            MIN(price_gbp) AS current_price
                     FROM whisky_stocks_table
                     WHERE import_date = ?
                     GROUP BY code
                 ),
                 historical_max AS (
                     SELECT code, MAX(price_gbp) AS old_price
                     FROM whisky_stocks_table
                     GROUP BY code
                 )
                 SELECT c.code,
                        c.title,
                        c.url,
                        c.current_price,
                        m.old_price,
                        m.old_price - c.current_price AS discount,
                        ROUND((m.old_price - c.current_price) / m.old_price * 100, 4)
                            AS perc_saving
                 FROM current_prices c
                 JOIN historical_max m ON c.code = m.code
                 WHERE m.old_price > 0
                   AND m.old_price - c.current_price > 0
                 ORDER BY discount DESC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![as_of], |row| {
                Ok(DiscountRow {
                    import_date: as_of,
                    code: row.get(0)?,
                    title: row.get(1)?,
                    url: row.get(2)?,
                    current_price: row.get(3)?,
                    old_price: row.get(4)?,
                    discount: row.get(5)?,
                    perc_saving: row.get(6)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    async fn stocks_and_median_values(&mut self) -> Result<Vec<DailyStockStats>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT import_date,
                        COUNT(*) AS stock_count,
                        MEDIAN(price_gbp) AS median_price,
                        SUM(availability) AS total_availability
                 FROM whisky_stocks_table
                 WHERE import_date IS NOT NULL
                 GROUP BY import_date
                 ORDER BY import_date DESC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DailyStockStats {
                    import_date: row.get(0)?,
                    stock_count: row.get(1)?,
                    median_price: row.get(2)?,
                    total_availability: row.get(3)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    async fn stocks_and_median_by_code(
        &mut self,
        codes: &[String],
    ) -> Result<Vec<CodeStockStats>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; codes.len()].join(", ");
        let mut stmt = self
            .conn
            .prepare(&format!(
                "WITH filtered AS (
                     SELECT import_date,
                            code,
                            MEDIAN(price_gbp) AS median_price,
                            SUM(availability) AS total_availability
                     FROM whisky_stocks_table
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
                 JOIN changes c ON f.code = c.code
                 ORDER BY f.import_date DESC, f.code"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params_from_iter(codes), |row| {
                Ok(CodeStockStats {
                    import_date: row.get(0)?,
                    code: row.get(1)?,
                    median_price: row.get(2)?,
                    total_availability: row.get(3)?,
                    price_changes_count: row.get(4)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    async fn units_sold(&mut self, on: NaiveDate) -> Result<Vec<UnitsSoldRow>> {
        let previous = on - Duration::days(1);
        let mut stmt = self
            .conn
            .prepare(
                "WITH current_day AS (
                     SELECT code,
                            SUM(availability) AS availability
                     FROM whisky_stocks_table
                     WHERE import_date = ?
                     GROUP BY code
                 ),
                 previous_day AS (
                     SELECT code,
                            MIN(title) AS title,
                            MIN(url) AS url,
                            MIN(price_gbp) AS price_gbp,
                            SUM(availability) AS availability
                     FROM whisky_stocks_table
                     WHERE import_date = ?
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
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![on, previous], |row| {
                Ok(UnitsSoldRow {
                    import_date: on,
                    code: row.get(0)?,
                    title: row.get(1)?,
                    url: row.get(2)?,
                    price_gbp: row.get(3)?,
                    availability: row.get(4)?,
                    units_sold: row.get(5)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        if let Some(dir) = &self.sales_dir {
            write_sales_csv(&rows, dir, on)?;
        }
        Ok(rows)
    }

    async fn price_search(&mut self, as_of: NaiveDate) -> Result<Vec<PriceRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT import_date, code, title, price_gbp, url
                 FROM whisky_stocks_table
                 WHERE import_date = ?",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![as_of], |row| {
                Ok(PriceRow {
                    import_date: row.get(0)?,
                    code: row.get(1)?,
                    title: row.get(2)?,
                    price_gbp: row.get(3)?,
                    url: row.get(4)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dram_store::HistoryStore;
    use std::fs;
    use std::path::Path;

    fn build_store(dir: &Path, snapshots: &[(&str, &str)]) -> HistoryStore {
        let data_dir = dir.join("data");
        fs::create_dir(&data_dir).unwrap();
        for (name, content) in snapshots {
            fs::write(data_dir.join(name), content).unwrap();
        }
        let mut store = HistoryStore::open(&dir.join("test.db"), "Whisky").unwrap();
        store.rebuild(&data_dir).unwrap();
        store
    }

    fn queries(store: &HistoryStore, sales_dir: Option<PathBuf>) -> DuckDbQueries {
        DuckDbQueries::new(store.clone_connection().unwrap(), sales_dir)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_discounted_items_against_historical_max() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp,availability\nHED1,Lagavulin 16,Whisky,100,5\n",
                ),
                (
                    "stock_2024_01_02.csv",
                    "code,title,type,price_gbp,availability\nHED1,Lagavulin 16,Whisky,80,5\n",
                ),
            ],
        );
        let mut q = queries(&store, None);

        let rows = q.discounted_items(date(2024, 1, 2)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "HED1");
        assert_relative_eq!(rows[0].old_price, 100.0);
        assert_relative_eq!(rows[0].current_price, 80.0);
        assert_relative_eq!(rows[0].discount, 20.0);
        assert_relative_eq!(rows[0].perc_saving, 20.0);
        assert_eq!(rows[0].import_date, date(2024, 1, 2));
    }

    #[tokio::test]
    async fn test_discounted_items_excludes_non_discounts_and_zero_max() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp\nHED1,A,Whisky,80\nHED2,B,Whisky,0\n",
                ),
                (
                    "stock_2024_01_02.csv",
                    "code,title,type,price_gbp\nHED1,A,Whisky,90\nHED2,B,Whisky,0\n",
                ),
            ],
        );
        let mut q = queries(&store, None);

        // HED1 went up, HED2 never had a non-zero price: neither is a discount.
        let rows = q.discounted_items(date(2024, 1, 2)).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_median_of_five_known_prices() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[(
                "stock_2024_01_01.csv",
                "code,title,type,price_gbp,availability\n\
                 HED1,A,Whisky,10,1\nHED2,B,Whisky,20,2\nHED3,C,Whisky,30,3\n\
                 HED4,D,Whisky,40,4\nHED5,E,Whisky,50,5\n",
            )],
        );
        let mut q = queries(&store, None);

        let rows = q.stocks_and_median_values().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stock_count, 5);
        assert_relative_eq!(rows[0].median_price.unwrap(), 30.0);
        assert_relative_eq!(rows[0].total_availability.unwrap(), 15.0);
    }

    #[tokio::test]
    async fn test_daily_stats_ordered_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                ("stock_2024_01_01.csv", "code,title,type,price_gbp\nHED1,A,Whisky,10\n"),
                ("stock_2024_01_02.csv", "code,title,type,price_gbp\nHED1,A,Whisky,20\n"),
            ],
        );
        let mut q = queries(&store, None);

        let rows = q.stocks_and_median_values().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].import_date, date(2024, 1, 2));
        assert_eq!(rows[1].import_date, date(2024, 1, 1));
    }

    #[tokio::test]
    async fn test_price_changes_count_by_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp\nHED1,A,Whisky,100\nHED2,B,Whisky,50\n",
                ),
                (
                    "stock_2024_01_02.csv",
                    "code,title,type,price_gbp\nHED1,A,Whisky,90\nHED2,B,Whisky,50\n",
                ),
                (
                    "stock_2024_01_03.csv",
                    "code,title,type,price_gbp\nHED1,A,Whisky,80\nHED2,B,Whisky,50\n",
                ),
            ],
        );
        let mut q = queries(&store, None);

        let codes = vec!["HED1".to_string(), "HED2".to_string()];
        let rows = q.stocks_and_median_by_code(&codes).await.unwrap();
        assert_eq!(rows.len(), 6);
        let hed1 = rows.iter().find(|r| r.code == "HED1").unwrap();
        let hed2 = rows.iter().find(|r| r.code == "HED2").unwrap();
        assert_eq!(hed1.price_changes_count, 3);
        assert_eq!(hed2.price_changes_count, 1);

        assert!(q.stocks_and_median_by_code(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_units_sold_positive_deltas_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp,availability\n\
                     HED1,A,Whisky,100,5\nHED2,B,Whisky,50,3\nHED3,C,Whisky,20,2\n",
                ),
                (
                    "stock_2024_01_02.csv",
                    "code,title,type,price_gbp,availability\n\
                     HED1,A,Whisky,100,3\nHED2,B,Whisky,50,3\nHED3,C,Whisky,20,6\n",
                ),
            ],
        );
        let mut q = queries(&store, None);

        let rows = q.units_sold(date(2024, 1, 2)).await.unwrap();
        // HED2 unchanged, HED3 restocked: both excluded.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "HED1");
        assert_relative_eq!(rows[0].units_sold, 2.0);
        assert_relative_eq!(rows[0].availability, 3.0);
    }

    #[tokio::test]
    async fn test_vanished_code_counts_as_full_sell_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp,availability\nHED2,B,Whisky,50,5\n",
                ),
                (
                    "stock_2024_01_02.csv",
                    "code,title,type,price_gbp,availability\nHED9,Z,Whisky,10,1\n",
                ),
            ],
        );
        let mut q = queries(&store, None);

        let rows = q.units_sold(date(2024, 1, 2)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "HED2");
        assert_relative_eq!(rows[0].availability, 0.0);
        assert_relative_eq!(rows[0].units_sold, 5.0);
    }

    #[tokio::test]
    async fn test_units_sold_writes_dated_export() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp,availability\nHED1,A,Whisky,100,5\n",
                ),
                (
                    "stock_2024_01_02.csv",
                    "code,title,type,price_gbp,availability\nHED1,A,Whisky,100,4\n",
                ),
            ],
        );
        let sales_dir = dir.path().join("sales");
        let mut q = queries(&store, Some(sales_dir.clone()));

        q.units_sold(date(2024, 1, 2)).await.unwrap();
        assert!(sales_dir.join("sales_2024_01_02.csv").exists());
    }

    #[tokio::test]
    async fn test_price_search_returns_day_slice() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            &[
                (
                    "stock_2024_01_01.csv",
                    "code,title,type,price_gbp\nHED1,A,Whisky,100\nHED2,B,Wine,30\n",
                ),
                ("stock_2024_01_02.csv", "code,title,type,price_gbp\nHED1,A,Whisky,90\n"),
            ],
        );
        let mut q = queries(&store, None);

        let rows = q.price_search(date(2024, 1, 1)).await.unwrap();
        // The Wine row never reaches the filtered view.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "HED1");
        assert_eq!(rows[0].price_gbp, Some(100.0));
    }
}
