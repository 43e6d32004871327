//! Analytical queries over the stock history, backend-agnostic.
//!
//! This crate handles:
//! - The query contract shared by both backends
//! - The embedded DuckDB implementation (exact medians)
//! - The remote Athena implementation (approximate percentiles,
//!   bounded polling)
//! - The dated sales CSV export

pub mod athena;
pub mod backend;
pub mod duckdb;
pub mod export;

pub use athena::AthenaQueries;
pub use backend::StockQueries;
pub use duckdb::DuckDbQueries;
pub use export::write_sales_csv;
