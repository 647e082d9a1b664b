//! Batch calculation of every contract for one royalty period.
//!
//! Contracts run on blocking tasks bounded by a semaphore. Two workers in
//! this process never calculate the same contract at once (keyed lock);
//! other processes are excluded by SQLite's write lock and the advance
//! version check, surfacing as a retryable concurrency error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use folio_db::{DbError, SqliteStore};
use folio_royalty::auth::CalculationPermit;
use folio_royalty::store::StoredCalculation;
use folio_royalty::{RoyaltyEngine, RoyaltyError};
use folio_types::{ContractId, RoyaltyPeriod, TenantId};
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::RunnerConfig;

/// Result of calculating one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed { record_id: u64, net_payable: Decimal },
    /// A record for this period already exists.
    Skipped,
    Failed { kind: &'static str, error: String },
}

/// Counts of outcomes across a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub committed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.committed + self.skipped + self.failed
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Committed { .. } => self.committed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// In-process lock per contract id.
#[derive(Default)]
struct ContractLocks {
    locks: Mutex<HashMap<ContractId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContractLocks {
    fn get(&self, contract_id: ContractId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(contract_id).or_default().clone()
    }
}

/// Runs calculations for every contract against one database file.
pub struct BatchRunner {
    db_path: PathBuf,
    config: RunnerConfig,
    locks: Arc<ContractLocks>,
}

impl BatchRunner {
    pub fn new(db_path: PathBuf, config: RunnerConfig) -> Self {
        Self {
            db_path,
            config,
            locks: Arc::new(ContractLocks::default()),
        }
    }

    /// Calculate `period` for every contract, optionally for one tenant.
    pub async fn run(
        &self,
        period: RoyaltyPeriod,
        tenant: Option<TenantId>,
    ) -> anyhow::Result<BatchSummary> {
        let path = self.db_path.clone();
        let lock_timeout = self.config.lock_timeout();
        let contracts = tokio::task::spawn_blocking(move || {
            SqliteStore::open(&path, lock_timeout)?.list_contracts(tenant)
        })
        .await??;

        info!(contracts = contracts.len(), period = %period, "batch starting");

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for (tenant_id, contract_id) in contracts {
            let permit = semaphore.clone().acquire_owned().await?;
            let job = ContractJob {
                db_path: self.db_path.clone(),
                tenant_id,
                contract_id,
                period,
                config: self.config.clone(),
                lock: self.locks.get(contract_id),
            };
            tasks.spawn(async move {
                let outcome = job.run().await;
                drop(permit);
                (tenant_id, contract_id, outcome)
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((tenant_id, contract_id, outcome)) => {
                    match &outcome {
                        Outcome::Committed {
                            record_id,
                            net_payable,
                        } => info!(tenant_id, contract_id, record_id, net_payable = %net_payable, "contract committed"),
                        Outcome::Skipped => {
                            info!(tenant_id, contract_id, "contract already calculated, skipped")
                        }
                        Outcome::Failed { kind, error } => {
                            error!(tenant_id, contract_id, kind, error = %error, "contract failed")
                        }
                    }
                    summary.record(&outcome);
                }
                Err(e) => {
                    error!(error = %e, "batch worker panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            period = %period,
            committed = summary.committed,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}

struct ContractJob {
    db_path: PathBuf,
    tenant_id: TenantId,
    contract_id: ContractId,
    period: RoyaltyPeriod,
    config: RunnerConfig,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl ContractJob {
    async fn run(self) -> Outcome {
        let _held = self.lock.clone().lock_owned().await;
        let mut attempt: u32 = 0;
        loop {
            let path = self.db_path.clone();
            let (tenant_id, contract_id, period) = (self.tenant_id, self.contract_id, self.period);
            let lock_timeout = self.config.lock_timeout();
            let result = tokio::task::spawn_blocking(move || {
                calculate_one(&path, lock_timeout, tenant_id, contract_id, period)
            })
            .await;

            match result {
                Ok(Ok(stored)) => {
                    return Outcome::Committed {
                        record_id: stored.id,
                        net_payable: stored.record.recoupment.net_payable,
                    }
                }
                Ok(Err(RoyaltyError::PeriodAlreadyCalculated { .. })) => return Outcome::Skipped,
                Ok(Err(e)) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff(
                        self.config.retry_base_delay(),
                        attempt,
                        self.config.retry_max_delay(),
                    );
                    attempt += 1;
                    warn!(
                        contract_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "commit conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => {
                    return Outcome::Failed {
                        kind: e.kind(),
                        error: e.to_string(),
                    }
                }
                Err(e) => {
                    return Outcome::Failed {
                        kind: "panic",
                        error: e.to_string(),
                    }
                }
            }
        }
    }
}

/// `base * 2^attempt`, never more than `max`.
fn backoff(base: Duration, attempt: u32, max: Duration) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

/// Open a store, load the contract, and calculate it with elevated access.
fn calculate_one(
    db_path: &Path,
    lock_timeout: Duration,
    tenant_id: TenantId,
    contract_id: ContractId,
    period: RoyaltyPeriod,
) -> folio_royalty::Result<StoredCalculation> {
    let store =
        SqliteStore::open(db_path, lock_timeout).map_err(|e| store_error(e, contract_id))?;
    let contract = store
        .load_contract(tenant_id, contract_id)
        .map_err(|e| store_error(e, contract_id))?;
    let engine = RoyaltyEngine::new(store);
    engine.calculate(
        &CalculationPermit::elevated(tenant_id),
        &contract,
        &period,
        Utc::now(),
    )
}

fn store_error(e: DbError, contract_id: ContractId) -> RoyaltyError {
    if e.is_busy() {
        return RoyaltyError::Concurrency { contract_id };
    }
    match e {
        DbError::NotFound(_) => RoyaltyError::ContractNotFound { contract_id },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use folio_royalty::store::LedgerStore;
    use folio_types::{AdvanceState, Contract, ContractTier, Format, TierCalculationMode};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn h1() -> RoyaltyPeriod {
        RoyaltyPeriod::new(date(2026, 1, 1), date(2026, 6, 30)).expect("period")
    }

    fn flat_contract(id: ContractId, tenant_id: TenantId, title_id: u64) -> Contract {
        Contract {
            id,
            tenant_id,
            title_id,
            tier_calculation_mode: TierCalculationMode::Period,
            tiers: vec![ContractTier {
                id: id * 10,
                format: Format::Physical,
                min_quantity: dec!(0),
                max_quantity: None,
                rate: dec!(0.10),
            }],
            advance: AdvanceState::new(dec!(50.00), dec!(0)),
            splits: vec![],
        }
    }

    /// Three contracts; contract 3's sales feed is not loaded.
    fn seed(path: &Path) {
        let store = SqliteStore::open(path, Duration::from_secs(1)).expect("open");
        for (id, tenant, title) in [(1, 7, 10), (2, 7, 11), (3, 8, 12)] {
            store
                .insert_contract(&flat_contract(id, tenant, title))
                .expect("contract");
        }
        for (tenant, title) in [(7, 10), (7, 11)] {
            store
                .record_sale(tenant, title, Format::Physical, date(2026, 3, 1), 100, dec!(1000))
                .expect("sale");
            store
                .mark_loaded_through(tenant, title, Format::Physical, date(2026, 6, 30))
                .expect("coverage");
        }
    }

    fn config() -> RunnerConfig {
        RunnerConfig {
            max_workers: 2,
            max_retries: 10,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 50,
            lock_timeout_ms: 200,
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(10);
        assert_eq!(backoff(base, 0, max), Duration::from_millis(100));
        assert_eq!(backoff(base, 3, max), Duration::from_millis(800));
        assert_eq!(backoff(base, 7, max), Duration::from_secs(10));
        assert_eq!(backoff(base, 31, max), max);
        assert_eq!(backoff(base, 200, max), max);
    }

    #[test]
    fn test_backoff_is_capped_for_configured_retries() {
        let config = RunnerConfig {
            max_retries: 40,
            ..RunnerConfig::default()
        };
        let longest = (0..config.max_retries)
            .map(|attempt| backoff(config.retry_base_delay(), attempt, config.retry_max_delay()))
            .max();
        assert_eq!(longest, Some(config.retry_max_delay()));
    }

    #[tokio::test]
    async fn test_batch_commits_then_skips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("folio.db");
        seed(&path);

        let runner = BatchRunner::new(path.clone(), config());
        let summary = runner.run(h1(), None).await.expect("run");
        assert_eq!(
            summary,
            BatchSummary {
                committed: 2,
                skipped: 0,
                failed: 1
            }
        );

        let again = runner.run(h1(), None).await.expect("rerun");
        assert_eq!(again.committed, 0);
        assert_eq!(again.skipped, 2);
        assert_eq!(again.failed, 1);

        let store = SqliteStore::open(&path, Duration::from_secs(1)).expect("open");
        let records = store.records_for_contract(7, 1).expect("records");
        assert_eq!(records.len(), 1);
        // 100 royalty, 50 recouped.
        assert_eq!(records[0].record.gross_royalty, dec!(100.00));
        assert_eq!(records[0].record.recoupment.net_payable, dec!(50.00));
    }

    #[tokio::test]
    async fn test_batch_limited_to_tenant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("folio.db");
        seed(&path);

        let summary = BatchRunner::new(path, config())
            .run(h1(), Some(7))
            .await
            .expect("run");
        assert_eq!(summary.committed, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_racing_runners_commit_each_contract_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("folio.db");
        seed(&path);

        let a = BatchRunner::new(path.clone(), config());
        let b = BatchRunner::new(path.clone(), config());
        let (first, second) = tokio::join!(a.run(h1(), Some(7)), b.run(h1(), Some(7)));
        let (first, second) = (first.expect("first"), second.expect("second"));

        assert_eq!(first.committed + second.committed, 2);
        assert_eq!(first.skipped + second.skipped, 2);
        assert_eq!(first.failed + second.failed, 0);

        let store = SqliteStore::open(&path, Duration::from_secs(1)).expect("open");
        let contract = store.load_contract(7, 1).expect("contract");
        assert_eq!(contract.advance.recouped, dec!(50.00));
    }
}
