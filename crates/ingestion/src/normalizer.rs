//! Snapshot normalization: heterogeneous daily CSV files into one
//! canonical row set.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use dram_core::{Error, Result, StockRecord};

use crate::aliases::HeaderMap;

/// Extract the snapshot day from a file name.
///
/// The date comes from a `YYYY_MM_DD` token embedded in the name, never
/// from file content. A name without the token yields None; such rows
/// load with a null `import_date` and stay invisible to the "today"
/// slice (intentional soft-fail).
pub fn extract_import_date(file_name: &str) -> Option<NaiveDate> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"\d{4}_\d{2}_\d{2}").unwrap());
    let matched = token.find(file_name)?;
    NaiveDate::parse_from_str(matched.as_str(), "%Y_%m_%d").ok()
}

/// Best-effort numeric cast: null on failure, never an error.
///
/// Tolerates currency signs and thousands separators seen in older
/// exports.
fn cast_f64(cell: Option<&str>) -> Option<f64> {
    let cleaned: String = cell?
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | ',' | ' '))
        .collect();
    cleaned.parse().ok()
}

fn cast_string(cell: Option<&str>) -> Option<String> {
    cell.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Normalize one snapshot file into canonical records.
///
/// Malformed rows and rows without a `code` are skipped with a warning;
/// only an unreadable file or header is an error.
pub fn normalize_file(path: &Path) -> Result<Vec<StockRecord>> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let import_date = extract_import_date(&file_name);
    if import_date.is_none() {
        warn!(file = %file_name, "no date token in file name, loading with null import_date");
    }

    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| Error::parse(format!("{file_name}: unreadable header: {e}")))?
        .clone();
    let header_map = HeaderMap::resolve(&headers);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(file = %file_name, line, error = %e, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };

        let code = match header_map.coalesce("code", &row) {
            Some(code) => code.to_string(),
            None => {
                warn!(file = %file_name, line, "skipping row without a code");
                skipped += 1;
                continue;
            }
        };

        records.push(StockRecord {
            code,
            title: header_map
                .coalesce("title", &row)
                .unwrap_or_default()
                .trim()
                .to_string(),
            abv: cast_f64(header_map.coalesce("abv", &row)),
            price_gbp: cast_f64(header_map.coalesce("price_gbp", &row)),
            price_ex_vat: cast_f64(header_map.coalesce("price_ex_vat", &row)),
            price_incl_vat: cast_f64(header_map.coalesce("price_incl_vat", &row)),
            availability: cast_f64(header_map.coalesce("availability", &row)),
            country: cast_string(header_map.coalesce("country", &row)),
            kind: cast_string(header_map.coalesce("type", &row)),
            size: cast_string(header_map.coalesce("size", &row)),
            style: cast_string(header_map.coalesce("style", &row)),
            vintage: cast_string(header_map.coalesce("vintage", &row)),
            url: cast_string(header_map.coalesce("url", &row)),
            import_date,
        });
    }

    if skipped > 0 {
        warn!(file = %file_name, skipped, kept = records.len(), "rows skipped during normalization");
    }
    Ok(records)
}

/// Normalize every `*.csv` snapshot under a directory.
///
/// A file that fails to parse is logged and skipped so one corrupt
/// snapshot cannot abort the whole batch. An empty directory yields an
/// empty row set, not an error. Files are visited in name order so a
/// rebuild over unchanged input is deterministic.
pub fn normalize_dir(dir: &Path) -> Result<Vec<StockRecord>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in &paths {
        match normalize_file(path) {
            Ok(mut rows) => records.append(&mut rows),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable snapshot");
            }
        }
    }
    Ok(records)
}
