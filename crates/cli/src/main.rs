//! Daily batch pipeline: normalize snapshots, rebuild the history
//! store, run the analytics queries, export sales.

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dram_core::{BackendKind, Config};
use dram_queries::{AthenaQueries, DuckDbQueries, StockQueries};
use dram_store::HistoryStore;

/// Per-code price history is only tracked for the deepest discounts;
/// keeps the by-code query (and its Athena scan cost) bounded.
const MAX_TRACKED_DISCOUNT_CODES: usize = 20;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env().context("loading configuration")?;
    let today = Local::now().date_naive();

    // Ingestion failures abort before analytics: stale-but-consistent
    // data beats a partially updated store.
    let mut store = HistoryStore::open(&config.db_path, &config.product_filter)
        .context("opening history store")?;
    let summary = store
        .rebuild(&config.data_dir)
        .context("rebuilding history from snapshots")?;
    info!(rows = summary.rows_loaded, days = summary.days, "ingestion complete");

    let mut queries: Box<dyn StockQueries> = match config.backend {
        BackendKind::DuckDb => Box::new(DuckDbQueries::new(
            store.clone_connection().context("cloning store connection")?,
            Some(config.sales_dir.clone()),
        )),
        BackendKind::Athena => Box::new(
            AthenaQueries::from_env(&config.athena, Some(config.sales_dir.clone())).await,
        ),
    };

    // One failed query must not block the independent ones.
    let mut discount_codes = Vec::new();
    match queries.discounted_items(today).await {
        Ok(rows) => {
            info!(rows = rows.len(), "discounted items");
            discount_codes = rows.into_iter().map(|r| r.code).collect();
        }
        Err(e) => error!(error = %e, "discounted items query failed"),
    }

    match queries.stocks_and_median_values().await {
        Ok(rows) => info!(days = rows.len(), "stock and median values"),
        Err(e) => error!(error = %e, "stock and median values query failed"),
    }

    discount_codes.truncate(MAX_TRACKED_DISCOUNT_CODES);
    if !discount_codes.is_empty() {
        match queries.stocks_and_median_by_code(&discount_codes).await {
            Ok(rows) => info!(rows = rows.len(), "per-code price history"),
            Err(e) => error!(error = %e, "per-code price history query failed"),
        }
    }

    match queries.units_sold(today).await {
        Ok(rows) => info!(rows = rows.len(), "units sold, export written"),
        Err(e) => error!(error = %e, "units sold query failed"),
    }

    match queries.price_search(today).await {
        Ok(rows) => info!(rows = rows.len(), "price search slice"),
        Err(e) => error!(error = %e, "price search query failed"),
    }

    Ok(())
}
