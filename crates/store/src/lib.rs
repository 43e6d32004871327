//! Stock history persistence for the dramline system.
//!
//! This crate owns the embedded DuckDB store:
//! - Full drop-and-recreate rebuild of the history table from a
//!   snapshot directory
//! - The type-filtered view with price coalescing
//! - The "today" slice view

pub mod history;

pub use history::{HistoryStore, RebuildSummary};
