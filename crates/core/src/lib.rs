//! Core types and configuration for the dramline stock analytics system.
//!
//! This crate provides shared types used across all other crates:
//! - Canonical stock snapshot rows and query result rows
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{AthenaConfig, BackendKind, Config};
pub use error::{Error, Result};
pub use types::*;
