//! Composition of the immutable calculation record.
//!
//! Pure: no I/O and no clock reads. The caller supplies `calculated_at`.
//! Every total is re-checked before the record is produced so that a record
//! that does not reconcile to the cent is never handed to the ledger.

use chrono::{DateTime, Utc};
use folio_types::{
    CalculationRecord, Contract, ContractId, ContractTier, Format, FormatResult, LifetimeContext,
    OwnerAllocation, RoyaltyPeriod, SalesPeriodTotals, TenantId, TierCalculationMode, TitleId,
};
use rust_decimal::Decimal;

use crate::advance::Recoupment;
use crate::tiers::{next_tier_threshold, TierAllocation};
use crate::{Result, RoyaltyError};

/// Identity and timing fields shared by every record for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordContext {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub title_id: TitleId,
    pub mode: TierCalculationMode,
    pub calculated_at: DateTime<Utc>,
}

impl RecordContext {
    pub fn for_contract(contract: &Contract, calculated_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id: contract.tenant_id,
            contract_id: contract.id,
            title_id: contract.title_id,
            mode: contract.tier_calculation_mode,
            calculated_at,
        }
    }
}

/// Build one format's result, attaching lifetime context in lifetime mode.
pub fn format_result(
    format: Format,
    sales: SalesPeriodTotals,
    tiers: &[ContractTier],
    mode: TierCalculationMode,
    lifetime_before: Decimal,
    allocation: TierAllocation,
) -> FormatResult {
    let lifetime = match mode {
        TierCalculationMode::Period => None,
        TierCalculationMode::Lifetime => {
            let units_after = lifetime_before + allocation.units();
            Some(LifetimeContext {
                units_before: lifetime_before,
                units_after,
                next_tier_at: next_tier_threshold(tiers, units_after),
            })
        }
    };
    FormatResult {
        format,
        sales,
        lifetime,
        tiers: allocation.breakdowns,
        royalty: allocation.royalty,
    }
}

/// Sum of format royalties.
pub fn gross_royalty(formats: &[FormatResult]) -> Decimal {
    formats.iter().map(|f| f.royalty).sum()
}

/// Compose the calculation record.
///
/// `allocations` is `None` for contracts without co-author splits.
///
/// # Errors
///
/// - [`RoyaltyError::Reconciliation`] if tier slices, gross royalty, or
///   owner allocations do not add up
pub fn assemble(
    ctx: &RecordContext,
    period: RoyaltyPeriod,
    formats: Vec<FormatResult>,
    recoupment: &Recoupment,
    allocations: Option<Vec<OwnerAllocation>>,
) -> Result<CalculationRecord> {
    for format in &formats {
        let slices: Decimal = format.tiers.iter().map(|t| t.royalty).sum();
        if slices != format.royalty {
            return Err(RoyaltyError::Reconciliation {
                what: "tier breakdown",
                expected: format.royalty,
                actual: slices,
            });
        }
    }

    let gross = gross_royalty(&formats);
    if gross != recoupment.gross {
        return Err(RoyaltyError::Reconciliation {
            what: "gross royalty",
            expected: recoupment.gross,
            actual: gross,
        });
    }

    let allocations = allocations.unwrap_or_default();
    if !allocations.is_empty() {
        let allocated: Decimal = allocations.iter().map(|a| a.amount).sum();
        if allocated != recoupment.net_payable {
            return Err(RoyaltyError::Reconciliation {
                what: "owner allocations",
                expected: recoupment.net_payable,
                actual: allocated,
            });
        }
    }

    Ok(CalculationRecord {
        tenant_id: ctx.tenant_id,
        contract_id: ctx.contract_id,
        title_id: ctx.title_id,
        period,
        mode: ctx.mode,
        formats,
        gross_royalty: gross,
        recoupment: recoupment.summary(),
        allocations,
        calculated_at: ctx.calculated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{advance, tiers};
    use chrono::{NaiveDate, TimeZone};
    use folio_types::AdvanceState;
    use rust_decimal_macros::dec;

    fn schedule() -> Vec<ContractTier> {
        vec![
            ContractTier {
                id: 1,
                format: Format::Physical,
                min_quantity: dec!(0),
                max_quantity: Some(dec!(50000)),
                rate: dec!(0.10),
            },
            ContractTier {
                id: 2,
                format: Format::Physical,
                min_quantity: dec!(50000),
                max_quantity: Some(dec!(100000)),
                rate: dec!(0.15),
            },
            ContractTier {
                id: 3,
                format: Format::Physical,
                min_quantity: dec!(100000),
                max_quantity: None,
                rate: dec!(0.20),
            },
        ]
    }

    fn ctx() -> RecordContext {
        RecordContext {
            tenant_id: 1,
            contract_id: 2,
            title_id: 3,
            mode: TierCalculationMode::Lifetime,
            calculated_at: Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).single().expect("ts"),
        }
    }

    fn period() -> RoyaltyPeriod {
        RoyaltyPeriod::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2026, 6, 30).expect("date"),
        )
        .expect("period")
    }

    fn crossover_result() -> FormatResult {
        let sales = SalesPeriodTotals::new(dec!(10000), dec!(100000));
        let allocation = tiers::allocate(
            sales.net_quantity,
            sales.net_revenue,
            &schedule(),
            TierCalculationMode::Lifetime,
            dec!(45000),
        )
        .expect("allocate");
        format_result(
            Format::Physical,
            sales,
            &schedule(),
            TierCalculationMode::Lifetime,
            dec!(45000),
            allocation,
        )
    }

    #[test]
    fn test_lifetime_context_reports_next_tier() {
        let result = crossover_result();
        let lifetime = result.lifetime.expect("lifetime context");
        assert_eq!(lifetime.units_before, dec!(45000));
        assert_eq!(lifetime.units_after, dec!(55000));
        assert_eq!(lifetime.next_tier_at, Some(dec!(100000)));
    }

    #[test]
    fn test_assemble_record() {
        let formats = vec![crossover_result()];
        let recoupment = advance::apply(gross_royalty(&formats), AdvanceState::new(dec!(2000), dec!(0)));
        let allocations = vec![
            OwnerAllocation {
                owner_id: 1,
                share_pct: dec!(50),
                amount: dec!(5250),
            },
            OwnerAllocation {
                owner_id: 2,
                share_pct: dec!(50),
                amount: dec!(5250),
            },
        ];
        let record =
            assemble(&ctx(), period(), formats, &recoupment, Some(allocations)).expect("assemble");

        assert_eq!(record.gross_royalty, dec!(12500));
        assert_eq!(record.recoupment.recouped_this_period, dec!(2000));
        assert_eq!(record.recoupment.net_payable, dec!(10500));
        assert_eq!(record.allocations.len(), 2);
        assert_eq!(record.formats[0].tiers.len(), 2);
    }

    #[test]
    fn test_assemble_rejects_mismatched_allocations() {
        let formats = vec![crossover_result()];
        let recoupment = advance::apply(gross_royalty(&formats), AdvanceState::default());
        let allocations = vec![OwnerAllocation {
            owner_id: 1,
            share_pct: dec!(100),
            amount: dec!(12499.99),
        }];
        let err = assemble(&ctx(), period(), formats, &recoupment, Some(allocations))
            .expect_err("mismatch");
        assert!(matches!(
            err,
            RoyaltyError::Reconciliation {
                what: "owner allocations",
                ..
            }
        ));
    }

    #[test]
    fn test_assemble_rejects_mismatched_gross() {
        let formats = vec![crossover_result()];
        let recoupment = advance::apply(dec!(1), AdvanceState::default());
        assert!(assemble(&ctx(), period(), formats, &recoupment, None).is_err());
    }

    #[test]
    fn test_period_mode_has_no_lifetime_context() {
        let sales = SalesPeriodTotals::new(dec!(10), dec!(100));
        let allocation =
            tiers::allocate(dec!(10), dec!(100), &schedule(), TierCalculationMode::Period, dec!(0))
                .expect("allocate");
        let result = format_result(
            Format::Physical,
            sales,
            &schedule(),
            TierCalculationMode::Period,
            dec!(0),
            allocation,
        );
        assert!(result.lifetime.is_none());
        assert_eq!(result.royalty, dec!(10));
    }
}
