//! [`SqliteStore`]: the engine's sales and ledger store over SQLite.
//!
//! Each store owns one connection. Batch workers open their own store on
//! the same database file; SQLite's write lock plus the contract's advance
//! version serialize commits across connections and processes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use folio_royalty::store::{CommitFn, LedgerStore, SalesStore, StoreAccess, StoredCalculation};
use folio_royalty::{Result as RoyaltyResult, RoyaltyError};
use folio_types::{
    CalculationDocument, Contract, ContractId, Format, RoyaltyPeriod, SalesPeriodTotals, TenantId,
    TitleId,
};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;

use crate::queries::{calculations, contracts, sales};
use crate::{DbError, Result};

/// SQLite-backed [`SalesStore`] and [`LedgerStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file, waiting up to `lock_timeout` for the write lock.
    pub fn open(path: &Path, lock_timeout: Duration) -> Result<Self> {
        Ok(Self::from_connection(crate::open_with_timeout(
            path,
            lock_timeout,
        )?))
    }

    /// Fresh in-memory database.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::from_connection(crate::open_memory()?))
    }

    /// Wrap an already configured and migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `f` with the connection held.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Insert a contract with its tiers and splits in one transaction.
    pub fn insert_contract(&self, contract: &Contract) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        contracts::insert(&tx, contract)?;
        tx.commit()?;
        Ok(())
    }

    /// Load a contract with its current advance state.
    pub fn load_contract(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<Contract> {
        self.with_conn(|conn| contracts::get(conn, tenant_id, contract_id))
    }

    /// Contract ids to calculate, optionally limited to one tenant.
    pub fn list_contracts(&self, tenant_id: Option<TenantId>) -> Result<Vec<(TenantId, ContractId)>> {
        self.with_conn(|conn| contracts::list_ids(conn, tenant_id))
    }

    /// Record one netted sales row.
    pub fn record_sale(
        &self,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        sale_date: NaiveDate,
        quantity: i64,
        revenue: Decimal,
    ) -> Result<()> {
        self.with_conn(|conn| {
            sales::insert(conn, tenant_id, title_id, format, sale_date, quantity, revenue)
        })
    }

    /// Mark a (title, format) feed as complete through `date`.
    pub fn mark_loaded_through(
        &self,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        date: NaiveDate,
    ) -> Result<()> {
        self.with_conn(|conn| sales::mark_loaded_through(conn, tenant_id, title_id, format, date))
    }

    fn commit_locked(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        period: &RoyaltyPeriod,
        compute: &mut CommitFn<'_>,
    ) -> RoyaltyResult<StoredCalculation> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| commit_error(DbError::from(e), contract_id))?;

        let row = contracts::advance_state(&tx, contract_id)
            .map_err(|e| commit_error(e, contract_id))?;
        if row.tenant_id != tenant_id {
            return Err(RoyaltyError::ContractNotFound { contract_id });
        }
        if calculations::exists(&tx, contract_id, period).map_err(|e| commit_error(e, contract_id))? {
            return Err(RoyaltyError::PeriodAlreadyCalculated {
                contract_id,
                period: *period,
            });
        }

        // Dropping `tx` on any early return rolls back.
        let pending = compute(row.state)?;
        contracts::update_advance(&tx, contract_id, &pending.advance, row.version)
            .map_err(|e| commit_error(e, contract_id))?;
        let document = CalculationDocument::from(pending.record);
        let id = calculations::insert(&tx, &document, Utc::now())
            .map_err(|e| commit_error(e, contract_id))?;
        tx.commit()
            .map_err(|e| commit_error(DbError::from(e), contract_id))?;

        tracing::debug!(
            contract_id,
            record_id = id,
            version = row.version + 1,
            "calculation persisted"
        );
        Ok(StoredCalculation {
            id,
            record: document.into_record(),
        })
    }
}

/// Map a storage failure during the persist step to the engine's taxonomy.
fn commit_error(e: DbError, contract_id: ContractId) -> RoyaltyError {
    if e.is_busy() {
        return RoyaltyError::Concurrency { contract_id };
    }
    match e {
        DbError::Conflict { contract_id } => RoyaltyError::Concurrency { contract_id },
        DbError::NotFound(_) => RoyaltyError::ContractNotFound { contract_id },
        other => other.into(),
    }
}

fn check_access(access: &StoreAccess, tenant_id: TenantId) -> RoyaltyResult<()> {
    if access.permits(tenant_id) {
        Ok(())
    } else {
        Err(RoyaltyError::Unauthorized { tenant_id })
    }
}

impl SalesStore for SqliteStore {
    fn net_sales_for_period(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        period: &RoyaltyPeriod,
    ) -> RoyaltyResult<Option<SalesPeriodTotals>> {
        check_access(access, tenant_id)?;
        let conn = self.lock()?;
        match sales::loaded_through(&conn, tenant_id, title_id, format)? {
            Some(through) if through >= period.end => {}
            _ => return Ok(None),
        }
        let totals =
            sales::period_totals(&conn, tenant_id, title_id, format, period.start, period.end)?;
        Ok(Some(totals))
    }

    fn lifetime_sales_before(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        before: NaiveDate,
    ) -> RoyaltyResult<Decimal> {
        check_access(access, tenant_id)?;
        let conn = self.lock()?;
        Ok(sales::net_units_before(&conn, tenant_id, title_id, format, before)?)
    }
}

impl LedgerStore for SqliteStore {
    fn commit_calculation(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        period: &RoyaltyPeriod,
        compute: &mut CommitFn<'_>,
    ) -> RoyaltyResult<StoredCalculation> {
        self.commit_locked(tenant_id, contract_id, period, compute)
    }

    fn records_for_contract(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
    ) -> RoyaltyResult<Vec<StoredCalculation>> {
        Ok(self.with_conn(|conn| calculations::list_for_contract(conn, tenant_id, contract_id))?)
    }
}
