//! # folio-types
//!
//! Shared domain types for royalty calculation: contracts and their tier
//! schedules, sales totals, advance state, and the append-only calculation
//! record consumed by statement rendering.

pub mod advance;
pub mod calculation;
pub mod contract;
pub mod sales;

pub use advance::AdvanceState;
pub use calculation::{
    CalculationDocument, CalculationRecord, FormatResult, LifetimeContext, OwnerAllocation,
    QuantityInterval, RecoupmentSummary, TierBreakdown,
};
pub use contract::{CoAuthorSplit, Contract, ContractTier, Format, TierCalculationMode};
pub use sales::{RoyaltyPeriod, SalesPeriodTotals};

/// Common identifier aliases. All ids are assigned by the relational store.
pub type TenantId = u64;
pub type TitleId = u64;
pub type ContractId = u64;
pub type TierId = u64;
pub type OwnerId = u64;

/// Smallest currency unit, in decimal places (cents).
pub const CURRENCY_SCALE: u32 = 2;

/// Co-author shares are percentages and must total exactly this value.
pub const FULL_OWNERSHIP_PCT: u32 = 100;

/// Errors raised while parsing or constructing domain types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Unknown format label.
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// Unknown tier calculation mode label.
    #[error("unknown tier calculation mode: {0}")]
    UnknownMode(String),

    /// Period end precedes period start.
    #[error("invalid period: end {end} precedes start {start}")]
    InvalidPeriod {
        /// Period start.
        start: chrono::NaiveDate,
        /// Period end.
        end: chrono::NaiveDate,
    },

    /// Calculation document failed to (de)serialize.
    #[error("calculation document: {0}")]
    Document(#[from] serde_json::Error),
}
