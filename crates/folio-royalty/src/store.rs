//! Data-access contracts consumed by the engine.
//!
//! The engine reads two things from the sales store (period net totals and
//! the lifetime position before a date) and performs one write: appending a
//! calculation record together with the contract's new advance state.

use chrono::NaiveDate;
use folio_types::{
    AdvanceState, CalculationRecord, ContractId, Format, RoyaltyPeriod, SalesPeriodTotals,
    TenantId, TitleId,
};
use rust_decimal::Decimal;

use crate::auth::PrincipalId;
use crate::Result;

/// Credential used to reach storage. The query semantics are identical for
/// both; only tenant scoping differs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreAccess {
    /// A signed-in user; restricted to their own tenant.
    Interactive {
        principal: PrincipalId,
        tenant_id: TenantId,
    },
    /// Background and batch jobs running with service credentials.
    Elevated,
}

impl StoreAccess {
    /// Whether this credential may read data belonging to `tenant_id`.
    pub fn permits(&self, tenant_id: TenantId) -> bool {
        match self {
            StoreAccess::Interactive {
                tenant_id: scope, ..
            } => *scope == tenant_id,
            StoreAccess::Elevated => true,
        }
    }

    /// Label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            StoreAccess::Interactive { .. } => "interactive",
            StoreAccess::Elevated => "elevated",
        }
    }
}

/// Read access to netted sales.
pub trait SalesStore: Send + Sync {
    /// Net (sales minus returns) totals for one format in the period.
    ///
    /// `Ok(None)` means sales for the period have not been loaded; the
    /// engine reports that as missing data rather than assuming zero.
    fn net_sales_for_period(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        period: &RoyaltyPeriod,
    ) -> Result<Option<SalesPeriodTotals>>;

    /// Signed sum of net units strictly before `before`. Returns are
    /// included, so the sum can fall as `before` moves forward or go below
    /// zero; [`crate::lifetime::LifetimeSalesResolver`] applies the per-period clamp.
    fn lifetime_sales_before(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        before: NaiveDate,
    ) -> Result<Decimal>;
}

/// What the compute step hands back to be written.
#[derive(Clone, Debug)]
pub struct PendingCommit {
    pub advance: AdvanceState,
    pub record: CalculationRecord,
}

/// A persisted calculation record and its store-assigned id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCalculation {
    pub id: u64,
    pub record: CalculationRecord,
}

/// Compute step run while the contract is exclusively held.
pub type CommitFn<'a> = dyn FnMut(AdvanceState) -> Result<PendingCommit> + 'a;

/// Append-only calculation history plus the contract's advance state.
pub trait LedgerStore: Send + Sync {
    /// Serializable persist step for one contract.
    ///
    /// Implementations must hold the contract exclusively while they read
    /// its current advance state, call `compute` with it, and write both the
    /// returned advance state and the record. If `compute` fails or the
    /// write fails, nothing is changed. A second record for the same
    /// (contract, period) is rejected with
    /// [`RoyaltyError::PeriodAlreadyCalculated`](crate::RoyaltyError::PeriodAlreadyCalculated).
    /// If the contract cannot be acquired, implementations return
    /// [`RoyaltyError::Concurrency`](crate::RoyaltyError::Concurrency).
    fn commit_calculation(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        period: &RoyaltyPeriod,
        compute: &mut CommitFn<'_>,
    ) -> Result<StoredCalculation>;

    /// All records for a contract, oldest first.
    fn records_for_contract(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<StoredCalculation>>;

    /// Record for the latest period calculated for a contract.
    fn latest_record(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
    ) -> Result<Option<StoredCalculation>> {
        Ok(self
            .records_for_contract(tenant_id, contract_id)?
            .into_iter()
            .max_by_key(|stored| (stored.record.period.end, stored.id)))
    }
}
