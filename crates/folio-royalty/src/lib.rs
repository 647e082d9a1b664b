//! # folio-royalty
//!
//! Royalty calculation engine.
//!
//! Given a title's net sales for a period and a contract's tier schedule,
//! computes the royalty owed per format, nets it against the outstanding
//! advance, and allocates the net payable across co-author owners.
//!
//! ## Modules
//!
//! - [`tiers`]: Tier schedule validation and interval-overlap allocation
//! - [`lifetime`]: Cumulative sales position before a period
//! - [`advance`]: Advance recoupment
//! - [`splits`]: Co-author split allocation with exact reconciliation
//! - [`assemble`]: Composition of the immutable calculation record
//! - [`projection`]: Tier crossover and annual royalty projections
//! - [`engine`]: Orchestration and the serializable persist step
//! - [`store`]: Data-access contracts consumed by the engine
//! - [`auth`]: Authorization capability required to commit a calculation
//! - [`memory`]: In-memory store for previews and tests

pub mod advance;
pub mod assemble;
pub mod auth;
pub mod engine;
pub mod lifetime;
pub mod memory;
pub mod projection;
pub mod splits;
pub mod store;
pub mod tiers;

use folio_types::{ContractId, Format, OwnerId, RoyaltyPeriod, TenantId, TierId, TitleId};
use rust_decimal::Decimal;

pub use engine::RoyaltyEngine;

/// Contract terms that violate an authoring-time invariant.
///
/// The engine never repairs these; the calculation is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A format schedule with no tiers was handed to the allocator.
    #[error("tier schedule is empty")]
    EmptySchedule,

    /// The first tier does not start at zero units.
    #[error("first tier {tier_id} starts at {min_quantity}, expected 0")]
    FirstTierNotZero {
        tier_id: TierId,
        min_quantity: Decimal,
    },

    /// Tiers are not ascending by `min_quantity`.
    #[error("tier {tier_id} is out of order")]
    Unsorted { tier_id: TierId },

    /// Two consecutive tiers share quantity positions.
    #[error("tiers {previous} and {next} overlap")]
    Overlap { previous: TierId, next: TierId },

    /// Quantity positions between two consecutive tiers are uncovered.
    #[error("gap between tiers {previous} and {next}")]
    Gap { previous: TierId, next: TierId },

    /// A bounded tier whose upper bound does not exceed its lower bound.
    #[error("tier {tier_id} has an empty range")]
    EmptyRange { tier_id: TierId },

    /// An open-ended tier that is followed by more tiers.
    #[error("tier {tier_id} is open-ended but not last")]
    UnboundedBeforeLast { tier_id: TierId },

    /// The last tier has an upper bound.
    #[error("final tier {tier_id} must be open-ended")]
    BoundedFinalTier { tier_id: TierId },

    /// Tiers in one schedule belong to different formats.
    #[error("tier {tier_id} belongs to {found}, expected {expected}")]
    MixedFormats {
        tier_id: TierId,
        expected: Format,
        found: Format,
    },

    /// Rate outside `[0, 1]`.
    #[error("tier {tier_id} rate {rate} outside [0, 1]")]
    InvalidRate { tier_id: TierId, rate: Decimal },

    /// Co-author list is empty.
    #[error("no co-author owners supplied")]
    NoOwners,

    /// An owner appears twice.
    #[error("duplicate co-author {owner_id}")]
    DuplicateOwner { owner_id: OwnerId },

    /// An owner holds a zero or negative share.
    #[error("co-author {owner_id} share must be positive, got {share_pct}")]
    NonPositiveShare { owner_id: OwnerId, share_pct: Decimal },

    /// Shares do not total exactly 100%.
    #[error("co-author shares must sum to 100, got {total}")]
    SharesNotHundred { total: Decimal },
}

/// Error types for royalty calculation.
#[derive(Debug, thiserror::Error)]
pub enum RoyaltyError {
    /// Invalid contract terms; fatal for this contract until re-authored.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Sales data for a required format is not available for the period.
    #[error("sales data missing for title {title_id} format {format} in {period}")]
    MissingSales {
        title_id: TitleId,
        format: Format,
        period: RoyaltyPeriod,
    },

    /// Another calculation holds the contract; retry with backoff.
    #[error("contract {contract_id} is locked by another calculation")]
    Concurrency { contract_id: ContractId },

    /// A record already exists for this contract and period.
    #[error("contract {contract_id} already calculated for {period}")]
    PeriodAlreadyCalculated {
        contract_id: ContractId,
        period: RoyaltyPeriod,
    },

    /// The caller lacks the capability for this tenant.
    #[error("not authorized to calculate royalties for tenant {tenant_id}")]
    Unauthorized { tenant_id: TenantId },

    /// The contract is not known to the ledger.
    #[error("contract {contract_id} not found")]
    ContractNotFound { contract_id: ContractId },

    /// A negative amount was handed to the split allocator.
    #[error("cannot split negative amount {0}")]
    NegativeAmount(Decimal),

    /// Decimal arithmetic exceeded the representable range.
    #[error("arithmetic overflow in royalty calculation")]
    Overflow,

    /// Composed totals disagree; the record would not reconcile.
    #[error("reconciliation failed for {what}: expected {expected}, got {actual}")]
    Reconciliation {
        what: &'static str,
        expected: Decimal,
        actual: Decimal,
    },

    /// Underlying storage failure.
    #[error("store error: {0}")]
    Store(String),
}

impl RoyaltyError {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RoyaltyError::Configuration(_) => "configuration",
            RoyaltyError::MissingSales { .. } => "data",
            RoyaltyError::Concurrency { .. } => "concurrency",
            RoyaltyError::PeriodAlreadyCalculated { .. } => "already_calculated",
            RoyaltyError::Unauthorized { .. } => "unauthorized",
            RoyaltyError::ContractNotFound { .. } => "not_found",
            RoyaltyError::NegativeAmount(_) => "arithmetic",
            RoyaltyError::Overflow => "arithmetic",
            RoyaltyError::Reconciliation { .. } => "reconciliation",
            RoyaltyError::Store(_) => "store",
        }
    }

    /// Whether the caller should retry the whole calculation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RoyaltyError::Concurrency { .. })
    }
}

/// Convenience result type for royalty operations.
pub type Result<T> = std::result::Result<T, RoyaltyError>;
