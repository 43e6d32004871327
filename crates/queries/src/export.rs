//! Dated sales CSV export.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use dram_core::{Result, UnitsSoldRow};

/// Write the units-sold result to `sales_<YYYY_MM_DD>.csv` under `dir`.
///
/// Overwrites any previous export for the same date, so a rerun of the
/// query is idempotent. Returns the path written.
pub fn write_sales_csv(rows: &[UnitsSoldRow], dir: &Path, on: NaiveDate) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("sales_{}.csv", on.format("%Y_%m_%d")));

    let mut writer = csv::Writer::from_path(&path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "sales export written");
    Ok(path)
}
