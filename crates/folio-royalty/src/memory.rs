//! In-memory store.
//!
//! Holds sales rows, advance states, and calculation records behind one
//! mutex. The commit step runs entirely under that mutex, which serializes
//! calculations for every contract. Used for interactive previews against
//! staged data and throughout the engine's tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use folio_types::{
    AdvanceState, Contract, ContractId, Format, RoyaltyPeriod, SalesPeriodTotals, TenantId,
    TitleId,
};
use rust_decimal::Decimal;

use crate::store::{CommitFn, LedgerStore, SalesStore, StoreAccess, StoredCalculation};
use crate::{Result, RoyaltyError};

type SalesKey = (TenantId, TitleId, Format);

#[derive(Clone, Copy, Debug)]
struct SaleRow {
    date: NaiveDate,
    quantity: Decimal,
    revenue: Decimal,
}

#[derive(Debug)]
struct LedgerEntry {
    tenant_id: TenantId,
    stored: StoredCalculation,
}

#[derive(Debug, Default)]
struct Inner {
    sales: HashMap<SalesKey, Vec<SaleRow>>,
    loaded_through: HashMap<SalesKey, NaiveDate>,
    advances: HashMap<ContractId, (TenantId, AdvanceState)>,
    ledger: Vec<LedgerEntry>,
}

/// Mutex-guarded in-memory sales and ledger store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| RoyaltyError::Store("memory store mutex poisoned".to_string()))
    }

    /// Record a netted sale (negative quantity for returns). Recording also
    /// extends the loaded-through date for the key.
    pub fn record_sale(
        &self,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        date: NaiveDate,
        quantity: Decimal,
        revenue: Decimal,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let key = (tenant_id, title_id, format);
        inner.sales.entry(key).or_default().push(SaleRow {
            date,
            quantity,
            revenue,
        });
        let through = inner.loaded_through.entry(key).or_insert(date);
        if *through < date {
            *through = date;
        }
        Ok(())
    }

    /// Mark sales as fully loaded through `date` even if no rows exist.
    pub fn mark_loaded_through(
        &self,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        date: NaiveDate,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let through = inner
            .loaded_through
            .entry((tenant_id, title_id, format))
            .or_insert(date);
        if *through < date {
            *through = date;
        }
        Ok(())
    }

    /// Make a contract's advance state known to the ledger.
    pub fn register_contract(&self, contract: &Contract) -> Result<()> {
        self.lock()?
            .advances
            .insert(contract.id, (contract.tenant_id, contract.advance));
        Ok(())
    }

    /// Current advance state of a registered contract.
    pub fn advance_state(&self, contract_id: ContractId) -> Result<AdvanceState> {
        self.lock()?
            .advances
            .get(&contract_id)
            .map(|(_, state)| *state)
            .ok_or(RoyaltyError::ContractNotFound { contract_id })
    }
}

fn check_access(access: &StoreAccess, tenant_id: TenantId) -> Result<()> {
    if access.permits(tenant_id) {
        Ok(())
    } else {
        Err(RoyaltyError::Unauthorized { tenant_id })
    }
}

impl SalesStore for MemoryStore {
    fn net_sales_for_period(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        period: &RoyaltyPeriod,
    ) -> Result<Option<SalesPeriodTotals>> {
        check_access(access, tenant_id)?;
        let inner = self.lock()?;
        let key = (tenant_id, title_id, format);
        match inner.loaded_through.get(&key) {
            Some(through) if *through >= period.end => {}
            _ => return Ok(None),
        }

        let totals = inner
            .sales
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|row| row.date >= period.start && row.date <= period.end)
            .fold(SalesPeriodTotals::default(), |acc, row| {
                SalesPeriodTotals::new(acc.net_quantity + row.quantity, acc.net_revenue + row.revenue)
            });
        Ok(Some(totals))
    }

    fn lifetime_sales_before(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        before: NaiveDate,
    ) -> Result<Decimal> {
        check_access(access, tenant_id)?;
        let inner = self.lock()?;
        Ok(inner
            .sales
            .get(&(tenant_id, title_id, format))
            .into_iter()
            .flatten()
            .filter(|row| row.date < before)
            .map(|row| row.quantity)
            .sum())
    }
}

impl LedgerStore for MemoryStore {
    fn commit_calculation(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        period: &RoyaltyPeriod,
        compute: &mut CommitFn<'_>,
    ) -> Result<StoredCalculation> {
        let mut inner = self.lock()?;

        let (owner, advance) = *inner
            .advances
            .get(&contract_id)
            .ok_or(RoyaltyError::ContractNotFound { contract_id })?;
        if owner != tenant_id {
            return Err(RoyaltyError::ContractNotFound { contract_id });
        }
        if inner
            .ledger
            .iter()
            .any(|e| e.stored.record.contract_id == contract_id && e.stored.record.period == *period)
        {
            return Err(RoyaltyError::PeriodAlreadyCalculated {
                contract_id,
                period: *period,
            });
        }

        let pending = compute(advance)?;
        let stored = StoredCalculation {
            id: inner.ledger.len() as u64 + 1,
            record: pending.record,
        };
        inner.advances.insert(contract_id, (tenant_id, pending.advance));
        inner.ledger.push(LedgerEntry {
            tenant_id,
            stored: stored.clone(),
        });
        Ok(stored)
    }

    fn records_for_contract(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<StoredCalculation>> {
        Ok(self
            .lock()?
            .ledger
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.stored.record.contract_id == contract_id)
            .map(|e| e.stored.clone())
            .collect())
    }
}
