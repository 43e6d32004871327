//! Snapshot ingestion and schema normalization for the dramline system.
//!
//! This crate handles:
//! - Column alias resolution across historical snapshot schema variants
//! - Best-effort numeric casting
//! - Import date extraction from snapshot file names
//! - Directory-level normalization into one canonical row set

pub mod aliases;
pub mod normalizer;

pub use aliases::{ColumnAliases, TARGET_ALIASES};
pub use normalizer::{extract_import_date, normalize_dir, normalize_file};
