//! History table rebuild and derived views.

use std::path::Path;

use chrono::NaiveDate;
use duckdb::{params, Connection};
use tracing::{info, warn};

use dram_core::{Error, Result, StockRecord, CANONICAL_COLUMNS};
use dram_ingestion::normalize_dir;

/// Name of the full history table.
pub const HISTORY_TABLE: &str = "stocks_table";
/// Name of the type-filtered view.
pub const FILTERED_VIEW: &str = "whisky_stocks_table";
/// Name of the current-day slice view.
pub const TODAY_VIEW: &str = "whisky_stocks_table_today";

/// Outcome of one rebuild run, for pipeline logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Rows loaded into the history table.
    pub rows_loaded: usize,
    /// Distinct snapshot days in the rebuilt table.
    pub days: i64,
}

/// The embedded stock history store.
///
/// One store holds exactly one writer connection; the rebuild is the
/// only mutating operation and a run performs it at most once.
#[derive(Debug)]
pub struct HistoryStore {
    conn: Connection,
    product_filter: String,
}

impl HistoryStore {
    /// Open the store at `db_path`.
    ///
    /// Runs a trivial write probe so a database already held by another
    /// writer fails fast here with a clear diagnostic instead of midway
    /// through a rebuild.
    pub fn open(db_path: &Path, product_filter: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| Error::database(format!("cannot open {}: {e}", db_path.display())))?;
        conn.execute_batch(
            "CREATE OR REPLACE TABLE _writer_probe AS SELECT 1 AS ok;
             DROP TABLE _writer_probe;",
        )
        .map_err(|e| {
            Error::database(format!(
                "{} is not writable (held by another process?): {e}",
                db_path.display()
            ))
        })?;
        Ok(Self {
            conn,
            product_filter: product_filter.to_string(),
        })
    }

    /// Borrow the underlying connection (read paths, tests).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Clone the connection for a query-layer consumer sharing this
    /// database instance.
    pub fn clone_connection(&self) -> Result<Connection> {
        self.conn
            .try_clone()
            .map_err(|e| Error::database(e.to_string()))
    }

    /// Rebuild the full history from a snapshot directory.
    ///
    /// Normalizes every snapshot file, drops and recreates the history
    /// table, then recreates both derived views. Not rollback-atomic
    /// across the view steps: a failure during view recreation leaves
    /// the table correct but the views possibly stale, and the caller
    /// should retry the whole rebuild.
    pub fn rebuild(&mut self, snapshot_dir: &Path) -> Result<RebuildSummary> {
        let records = normalize_dir(snapshot_dir)?;
        if records.is_empty() {
            warn!(dir = %snapshot_dir.display(), "no snapshot rows found, rebuilding empty history");
        }

        self.replace_history_table(&records)?;
        self.recreate_views()?;

        let days = self.day_count()?;
        info!(rows = records.len(), days, "history rebuilt");
        Ok(RebuildSummary {
            rows_loaded: records.len(),
            days,
        })
    }

    fn replace_history_table(&mut self, records: &[StockRecord]) -> Result<()> {
        let columns = CANONICAL_COLUMNS.join(", ");
        let placeholders = vec!["?"; CANONICAL_COLUMNS.len()].join(", ");

        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::database(e.to_string()))?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {HISTORY_TABLE};
             CREATE TABLE {HISTORY_TABLE} (
                 abv DOUBLE,
                 availability DOUBLE,
                 code VARCHAR,
                 country VARCHAR,
                 type VARCHAR,
                 url VARCHAR,
                 price_gbp DOUBLE,
                 price_ex_vat DOUBLE,
                 price_incl_vat DOUBLE,
                 size VARCHAR,
                 style VARCHAR,
                 title VARCHAR,
                 vintage VARCHAR,
                 import_date DATE
             );"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

        {
            let mut insert = tx
                .prepare(&format!(
                    "INSERT INTO {HISTORY_TABLE} ({columns}) VALUES ({placeholders})"
                ))
                .map_err(|e| Error::database(e.to_string()))?;
            for record in records {
                insert
                    .execute(params![
                        record.abv,
                        record.availability,
                        record.code,
                        record.country,
                        record.kind,
                        record.url,
                        record.price_gbp,
                        record.price_ex_vat,
                        record.price_incl_vat,
                        record.size,
                        record.style,
                        record.title,
                        record.vintage,
                        record.import_date,
                    ])
                    .map_err(|e| Error::database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::database(e.to_string()))
    }

    fn recreate_views(&self) -> Result<()> {
        // The category filter comes from configuration, not external
        // input; quoted as a literal since CREATE VIEW takes no params.
        let filter = self.product_filter.replace('\'', "''");
        self.conn
            .execute_batch(&format!(
                "CREATE OR REPLACE VIEW {FILTERED_VIEW} AS
                 SELECT
                     abv,
                     availability,
                     code,
                     country,
                     type,
                     url,
                     COALESCE(price_gbp, price_incl_vat) AS price_gbp,
                     COALESCE(price_ex_vat, 0) AS price_ex_vat,
                     COALESCE(price_incl_vat, 0) AS price_incl_vat,
                     size,
                     style,
                     title,
                     vintage,
                     import_date
                 FROM {HISTORY_TABLE}
                 WHERE type = '{filter}';

                 CREATE OR REPLACE VIEW {TODAY_VIEW} AS
                 SELECT
                     import_date,
                     code,
                     title,
                     price_gbp,
                     url
                 FROM {FILTERED_VIEW}
                 WHERE import_date = CURRENT_DATE;"
            ))
            .map_err(|e| Error::database(e.to_string()))
    }

    /// Total rows in the history table.
    pub fn row_count(&self) -> Result<i64> {
        self.scalar_i64(&format!("SELECT COUNT(*) FROM {HISTORY_TABLE}"))
    }

    /// Distinct snapshot days in the history table.
    pub fn day_count(&self) -> Result<i64> {
        self.scalar_i64(&format!(
            "SELECT COUNT(DISTINCT import_date) FROM {HISTORY_TABLE}"
        ))
    }

    /// Most recent snapshot day, if any rows are dated.
    pub fn latest_import_date(&self) -> Result<Option<NaiveDate>> {
        self.conn
            .query_row(
                &format!("SELECT MAX(import_date) FROM {HISTORY_TABLE}"),
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))
    }

    fn scalar_i64(&self, sql: &str) -> Result<i64> {
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| Error::database(e.to_string()))
    }
}
