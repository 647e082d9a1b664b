//! folio-batch: calculates royalties for every contract in one period.
//!
//! Runs under service credentials. Configuration comes from
//! `$FOLIO_DATA_DIR/config.toml` unless `--config` names a file.

mod config;
mod runner;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use folio_types::{RoyaltyPeriod, TenantId};
use tracing::info;

use crate::config::BatchConfig;
use crate::runner::BatchRunner;

#[derive(Parser)]
#[command(author, version, about = "Royalty calculation batch for one period")]
struct Cli {
    /// First day of the period (YYYY-MM-DD).
    #[arg(long)]
    period_start: NaiveDate,
    /// Last day of the period, inclusive.
    #[arg(long)]
    period_end: NaiveDate,
    /// Only calculate this tenant's contracts.
    #[arg(long)]
    tenant: Option<TenantId>,
    /// Config file path.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = BatchConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("folio={}", config.logging.log_level).parse()?),
        )
        .init();

    let period = RoyaltyPeriod::new(cli.period_start, cli.period_end)?;

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let db_path = config.database_path();
    info!(db = %db_path.display(), period = %period, tenant = ?cli.tenant, "folio batch starting");

    let summary = BatchRunner::new(db_path, config.batch.clone())
        .run(period, cli.tenant)
        .await?;

    if summary.failed > 0 {
        anyhow::bail!("{} of {} contracts failed", summary.failed, summary.total());
    }
    Ok(())
}
