//! Calculation orchestration.
//!
//! ```text
//! sales store ──► tiers::allocate (+ lifetime position) ──► format results
//!                                                              │
//!           ledger lock ─► advance::apply ─► splits::split ─► assemble ─► append
//! ```
//!
//! Reads happen before the contract is locked; they are idempotent and safe
//! to repeat. Everything that depends on the advance balance runs inside
//! [`LedgerStore::commit_calculation`], so concurrent runs for one contract
//! never both consume the same balance.

use chrono::{DateTime, Days, NaiveDate, Utc};
use folio_types::{
    AdvanceState, CalculationRecord, Contract, Format, FormatResult, RoyaltyPeriod,
    SalesPeriodTotals, TierCalculationMode,
};
use rust_decimal::Decimal;

use crate::assemble::{self, RecordContext};
use crate::auth::CalculationPermit;
use crate::lifetime::{LifetimeAnchor, LifetimeSalesResolver};
use crate::projection::{self, PeriodCadence, Projection};
use crate::store::{LedgerStore, PendingCommit, SalesStore, StoreAccess, StoredCalculation};
use crate::{advance, splits, tiers, ConfigurationError, Result, RoyaltyError};

/// Reject a contract whose schedules or shares violate authoring invariants.
pub fn validate_contract(contract: &Contract) -> Result<()> {
    let formats = contract.formats();
    if formats.is_empty() {
        return Err(ConfigurationError::EmptySchedule.into());
    }
    for format in formats {
        tiers::validate_schedule(&contract.schedule(format))?;
    }
    if !contract.splits.is_empty() {
        splits::validate_shares(&contract.splits)?;
    }
    Ok(())
}

/// Royalty engine over a sales and ledger store.
pub struct RoyaltyEngine<S> {
    store: S,
}

impl<S> RoyaltyEngine<S>
where
    S: SalesStore + LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Calculate without persisting, using the contract's advance state as
    /// loaded by the caller.
    pub fn preview(
        &self,
        access: &StoreAccess,
        contract: &Contract,
        period: &RoyaltyPeriod,
        calculated_at: DateTime<Utc>,
    ) -> Result<CalculationRecord> {
        if !access.permits(contract.tenant_id) {
            return Err(RoyaltyError::Unauthorized {
                tenant_id: contract.tenant_id,
            });
        }
        validate_contract(contract)?;
        let formats = self.compute_formats(access, contract, period)?;
        let pending = settle(contract, period, formats, contract.advance, calculated_at)?;
        Ok(pending.record)
    }

    /// Calculate and commit one (contract, period).
    ///
    /// On any error nothing is written: the advance state and the record
    /// history are unchanged.
    pub fn calculate(
        &self,
        permit: &CalculationPermit,
        contract: &Contract,
        period: &RoyaltyPeriod,
        calculated_at: DateTime<Utc>,
    ) -> Result<StoredCalculation> {
        match self.try_calculate(permit, contract, period, calculated_at) {
            Ok(stored) => {
                tracing::info!(
                    tenant_id = contract.tenant_id,
                    contract_id = contract.id,
                    period = %period,
                    record_id = stored.id,
                    gross = %stored.record.gross_royalty,
                    recouped = %stored.record.recoupment.recouped_this_period,
                    net_payable = %stored.record.recoupment.net_payable,
                    access = permit.access().label(),
                    "royalty calculation committed"
                );
                Ok(stored)
            }
            Err(e) => {
                tracing::error!(
                    tenant_id = contract.tenant_id,
                    contract_id = contract.id,
                    period = %period,
                    kind = e.kind(),
                    error = %e,
                    "royalty calculation aborted"
                );
                Err(e)
            }
        }
    }

    fn try_calculate(
        &self,
        permit: &CalculationPermit,
        contract: &Contract,
        period: &RoyaltyPeriod,
        calculated_at: DateTime<Utc>,
    ) -> Result<StoredCalculation> {
        if !permit.covers(contract.tenant_id) {
            return Err(RoyaltyError::Unauthorized {
                tenant_id: contract.tenant_id,
            });
        }
        validate_contract(contract)?;
        let formats = self.compute_formats(permit.access(), contract, period)?;

        self.store.commit_calculation(
            contract.tenant_id,
            contract.id,
            period,
            &mut |locked: AdvanceState| {
                settle(contract, period, formats.clone(), locked, calculated_at)
            },
        )
    }

    /// Tier allocation for every format that has a schedule.
    fn compute_formats(
        &self,
        access: &StoreAccess,
        contract: &Contract,
        period: &RoyaltyPeriod,
    ) -> Result<Vec<FormatResult>> {
        let mode = contract.tier_calculation_mode;
        let committed = match mode {
            TierCalculationMode::Period => Vec::new(),
            TierCalculationMode::Lifetime => self.committed_before(contract, period.start)?,
        };
        let mut results = Vec::new();

        for format in contract.formats() {
            let schedule = contract.schedule(format);
            let sales = self
                .store
                .net_sales_for_period(access, contract.tenant_id, contract.title_id, format, period)?
                .ok_or(RoyaltyError::MissingSales {
                    title_id: contract.title_id,
                    format,
                    period: *period,
                })?;

            let lifetime_before = match mode {
                TierCalculationMode::Period => Decimal::ZERO,
                TierCalculationMode::Lifetime => self.resolve_position(
                    access,
                    contract,
                    format,
                    period.start,
                    anchor_for(&committed, format),
                )?,
            };

            let allocation = tiers::allocate(
                sales.net_quantity,
                sales.net_revenue,
                &schedule,
                mode,
                lifetime_before,
            )?;
            results.push(assemble::format_result(
                format,
                sales,
                &schedule,
                mode,
                lifetime_before,
                allocation,
            ));
        }

        Ok(results)
    }

    /// Lifetime position of `format` before `before`.
    ///
    /// Continues from the latest committed record that ends before `before`,
    /// so a return-heavy period never lowers the position an earlier period
    /// already consumed. Without such a record the full history is netted
    /// and floored at zero.
    pub fn lifetime_position(
        &self,
        access: &StoreAccess,
        contract: &Contract,
        format: Format,
        before: NaiveDate,
    ) -> Result<Decimal> {
        let committed = self.committed_before(contract, before)?;
        self.resolve_position(access, contract, format, before, anchor_for(&committed, format))
    }

    fn resolve_position(
        &self,
        access: &StoreAccess,
        contract: &Contract,
        format: Format,
        before: NaiveDate,
        anchor: Option<LifetimeAnchor>,
    ) -> Result<Decimal> {
        LifetimeSalesResolver::new(&self.store).resolve_from(
            access,
            contract.tenant_id,
            contract.title_id,
            format,
            before,
            anchor,
        )
    }

    /// Committed records ending before `before`, latest period last.
    fn committed_before(
        &self,
        contract: &Contract,
        before: NaiveDate,
    ) -> Result<Vec<CalculationRecord>> {
        let mut records: Vec<CalculationRecord> = self
            .store
            .records_for_contract(contract.tenant_id, contract.id)?
            .into_iter()
            .map(|stored| stored.record)
            .filter(|record| record.period.end < before)
            .collect();
        records.sort_by_key(|record| record.period.end);
        Ok(records)
    }

    /// Project one format forward from the given historical periods.
    ///
    /// Periods whose sales are not loaded are left out of the velocity and
    /// listed in [`Projection::unloaded_periods`]. Projection is dated from
    /// the day after the latest period end. In lifetime mode the position is
    /// the lifetime position at that day. In period mode tiers restart every
    /// period, so the position is zero and there is no crossover date.
    pub fn project(
        &self,
        access: &StoreAccess,
        contract: &Contract,
        format: Format,
        history: &[RoyaltyPeriod],
        cadence: PeriodCadence,
    ) -> Result<Option<Projection>> {
        let Some(latest_end) = history.iter().map(|p| p.end).max() else {
            return Ok(None);
        };
        let as_of = latest_end
            .checked_add_days(Days::new(1))
            .ok_or(RoyaltyError::Overflow)?;

        let mut recent: Vec<SalesPeriodTotals> = Vec::with_capacity(history.len());
        let mut unloaded = Vec::new();
        for period in history {
            match self.store.net_sales_for_period(
                access,
                contract.tenant_id,
                contract.title_id,
                format,
                period,
            )? {
                Some(totals) => recent.push(totals),
                None => unloaded.push(*period),
            }
        }
        if !unloaded.is_empty() {
            tracing::warn!(
                tenant_id = contract.tenant_id,
                contract_id = contract.id,
                %format,
                requested = history.len(),
                unloaded = unloaded.len(),
                "projecting without periods whose sales are not loaded"
            );
        }

        let position = match contract.tier_calculation_mode {
            TierCalculationMode::Period => Decimal::ZERO,
            TierCalculationMode::Lifetime => {
                self.lifetime_position(access, contract, format, as_of)?
            }
        };

        let mut projection =
            projection::project(&recent, &contract.schedule(format), position, as_of, cadence)?;
        if contract.tier_calculation_mode == TierCalculationMode::Period {
            projection.estimated_crossover_date = None;
        }
        projection.unloaded_periods = unloaded;
        Ok(Some(projection))
    }
}

/// Position committed for `format` by the latest record that carries one.
fn anchor_for(committed: &[CalculationRecord], format: Format) -> Option<LifetimeAnchor> {
    committed.iter().rev().find_map(|record| {
        let lifetime = record
            .formats
            .iter()
            .find(|result| result.format == format)?
            .lifetime?;
        Some(LifetimeAnchor {
            through: record.period.end,
            units: lifetime.units_after,
        })
    })
}

/// Recoup, split, and assemble against a given advance state.
fn settle(
    contract: &Contract,
    period: &RoyaltyPeriod,
    formats: Vec<FormatResult>,
    advance_state: AdvanceState,
    calculated_at: DateTime<Utc>,
) -> Result<PendingCommit> {
    let gross = assemble::gross_royalty(&formats);
    let recoupment = advance::apply(gross, advance_state);
    let allocations = if contract.splits.is_empty() {
        None
    } else {
        Some(splits::split(recoupment.net_payable, &contract.splits)?)
    };
    let record = assemble::assemble(
        &RecordContext::for_contract(contract, calculated_at),
        *period,
        formats,
        &recoupment,
        allocations,
    )?;
    Ok(PendingCommit {
        advance: recoupment.new_state,
        record,
    })
}
