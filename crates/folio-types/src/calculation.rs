//! The persisted output of one royalty calculation run.
//!
//! A [`CalculationRecord`] is created once per successful (contract, period)
//! calculation and never mutated afterwards. It is stored wrapped in a
//! [`CalculationDocument`], whose `schema_version` tag lets older documents
//! keep deserializing as the record layout evolves.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    ContractId, Format, OwnerId, RoyaltyPeriod, SalesPeriodTotals, TenantId,
    TierCalculationMode, TierId, TitleId, TypesError,
};

/// Schema version written by this build.
pub const CALCULATION_SCHEMA_VERSION: u32 = 1;

/// Half-open interval `[start, end)` of lifetime sales positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityInterval {
    pub start: Decimal,
    pub end: Decimal,
}

impl QuantityInterval {
    pub fn len(&self) -> Decimal {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Units and royalty that fell into one tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub tier_id: TierId,
    pub rate: Decimal,
    pub units: Decimal,
    pub royalty: Decimal,
    /// Lifetime positions consumed; only present in lifetime mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_interval: Option<QuantityInterval>,
}

/// Lifetime position context for statements ("lifetime sales: X, next tier at Y").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeContext {
    pub units_before: Decimal,
    pub units_after: Decimal,
    /// Lower bound of the next tier, `None` once in the open-ended tier.
    pub next_tier_at: Option<Decimal>,
}

/// Calculation result for one format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatResult {
    pub format: Format,
    pub sales: SalesPeriodTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<LifetimeContext>,
    pub tiers: Vec<TierBreakdown>,
    pub royalty: Decimal,
}

/// Advance recoupment applied in this run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoupmentSummary {
    pub advance_total: Decimal,
    pub recouped_before: Decimal,
    pub recouped_this_period: Decimal,
    pub recouped_after: Decimal,
    /// `gross - recouped_this_period` before flooring; kept for audit.
    pub net_payable_raw: Decimal,
    /// Amount payable to owners, floored at zero.
    pub net_payable: Decimal,
}

/// One co-owner's portion of the net payable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerAllocation {
    pub owner_id: OwnerId,
    pub share_pct: Decimal,
    pub amount: Decimal,
}

/// Immutable record of one (contract, period) calculation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRecord {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub title_id: TitleId,
    pub period: RoyaltyPeriod,
    pub mode: TierCalculationMode,
    pub formats: Vec<FormatResult>,
    pub gross_royalty: Decimal,
    pub recoupment: RecoupmentSummary,
    /// Empty when the contract has no co-author splits.
    pub allocations: Vec<OwnerAllocation>,
    pub calculated_at: DateTime<Utc>,
}

/// Versioned envelope for persisting a [`CalculationRecord`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema_version")]
pub enum CalculationDocument {
    #[serde(rename = "1")]
    V1(CalculationRecord),
}

impl CalculationDocument {
    pub fn schema_version(&self) -> u32 {
        match self {
            CalculationDocument::V1(_) => 1,
        }
    }

    pub fn to_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Upgrade any stored version to the current record layout.
    pub fn into_record(self) -> CalculationRecord {
        match self {
            CalculationDocument::V1(record) => record,
        }
    }
}

impl From<CalculationRecord> for CalculationDocument {
    fn from(record: CalculationRecord) -> Self {
        CalculationDocument::V1(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn sample_record() -> CalculationRecord {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).expect("date");
        let end = NaiveDate::from_ymd_opt(2026, 6, 30).expect("date");
        CalculationRecord {
            tenant_id: 7,
            contract_id: 11,
            title_id: 13,
            period: RoyaltyPeriod::new(start, end).expect("period"),
            mode: TierCalculationMode::Lifetime,
            formats: vec![FormatResult {
                format: Format::Physical,
                sales: SalesPeriodTotals::new(dec!(10000), dec!(100000)),
                lifetime: Some(LifetimeContext {
                    units_before: dec!(45000),
                    units_after: dec!(55000),
                    next_tier_at: None,
                }),
                tiers: vec![TierBreakdown {
                    tier_id: 1,
                    rate: dec!(0.10),
                    units: dec!(5000),
                    royalty: dec!(5000.00),
                    lifetime_interval: Some(QuantityInterval {
                        start: dec!(45000),
                        end: dec!(50000),
                    }),
                }],
                royalty: dec!(5000.00),
            }],
            gross_royalty: dec!(5000.00),
            recoupment: RecoupmentSummary {
                advance_total: Decimal::ZERO,
                recouped_before: Decimal::ZERO,
                recouped_this_period: Decimal::ZERO,
                recouped_after: Decimal::ZERO,
                net_payable_raw: dec!(5000.00),
                net_payable: dec!(5000.00),
            },
            allocations: vec![],
            calculated_at: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).single().expect("ts"),
        }
    }

    #[test]
    fn test_document_is_version_tagged() {
        let doc = CalculationDocument::from(sample_record());
        let json = doc.to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(value["schema_version"], "1");
        assert_eq!(value["mode"], "lifetime");
        assert_eq!(value["formats"][0]["tiers"][0]["units"], "5000");
        assert_eq!(doc.schema_version(), CALCULATION_SCHEMA_VERSION);
    }

    #[test]
    fn test_document_parses_back_to_same_record() {
        let record = sample_record();
        let json = CalculationDocument::from(record.clone()).to_json().expect("serialize");
        let parsed = CalculationDocument::from_json(&json).expect("parse").into_record();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let json = r#"{"schema_version":"99","tenant_id":1}"#;
        assert!(CalculationDocument::from_json(json).is_err());
    }

    #[test]
    fn test_interval_len() {
        let interval = QuantityInterval {
            start: dec!(45000),
            end: dec!(50000),
        };
        assert_eq!(interval.len(), dec!(5000));
        assert!(!interval.is_empty());
    }
}
