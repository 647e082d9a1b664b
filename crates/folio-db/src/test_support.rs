//! Shared fixtures for this crate's tests.

use chrono::{NaiveDate, TimeZone, Utc};
use folio_types::{
    AdvanceState, CalculationRecord, CoAuthorSplit, Contract, ContractId, ContractTier, Format,
    RecoupmentSummary, RoyaltyPeriod, TenantId, TierCalculationMode,
};
use rust_decimal_macros::dec;

/// Lifetime-mode contract for title 10: physical 10% to 50k then 15%,
/// ebook flat 25%, two co-authors.
pub(crate) fn sample(id: ContractId, tenant_id: TenantId) -> Contract {
    Contract {
        id,
        tenant_id,
        title_id: 10,
        tier_calculation_mode: TierCalculationMode::Lifetime,
        tiers: vec![
            ContractTier {
                id: id * 10 + 1,
                format: Format::Physical,
                min_quantity: dec!(0),
                max_quantity: Some(dec!(50000)),
                rate: dec!(0.10),
            },
            ContractTier {
                id: id * 10 + 2,
                format: Format::Physical,
                min_quantity: dec!(50000),
                max_quantity: None,
                rate: dec!(0.15),
            },
            ContractTier {
                id: id * 10 + 3,
                format: Format::Ebook,
                min_quantity: dec!(0),
                max_quantity: None,
                rate: dec!(0.25),
            },
        ],
        advance: AdvanceState::new(dec!(1000.00), dec!(250.50)),
        splits: vec![
            CoAuthorSplit {
                owner_id: 2,
                share_pct: dec!(33.33),
            },
            CoAuthorSplit {
                owner_id: 1,
                share_pct: dec!(66.67),
            },
        ],
    }
}

/// Minimal record for a contract produced by [`sample`], with no sales.
pub(crate) fn empty_record(contract: &Contract, period: RoyaltyPeriod) -> CalculationRecord {
    CalculationRecord {
        tenant_id: contract.tenant_id,
        contract_id: contract.id,
        title_id: contract.title_id,
        period,
        mode: contract.tier_calculation_mode,
        formats: vec![],
        gross_royalty: dec!(0),
        recoupment: RecoupmentSummary {
            advance_total: contract.advance.total,
            recouped_before: contract.advance.recouped,
            recouped_this_period: dec!(0),
            recouped_after: contract.advance.recouped,
            net_payable_raw: dec!(0),
            net_payable: dec!(0),
        },
        allocations: vec![],
        calculated_at: Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).single().expect("timestamp"),
    }
}

pub(crate) fn period(start: (i32, u32, u32), end: (i32, u32, u32)) -> RoyaltyPeriod {
    let date = |(y, m, d): (i32, u32, u32)| NaiveDate::from_ymd_opt(y, m, d).expect("date");
    RoyaltyPeriod::new(date(start), date(end)).expect("period")
}
