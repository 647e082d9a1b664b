//! Contract terms: tier schedules per format and co-author ownership.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AdvanceState, ContractId, OwnerId, TenantId, TierId, TitleId, TypesError};

/// Product format a tier schedule applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Physical,
    Ebook,
    Audiobook,
}

impl Format {
    /// Storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Physical => "physical",
            Format::Ebook => "ebook",
            Format::Audiobook => "audiobook",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(Format::Physical),
            "ebook" => Ok(Format::Ebook),
            "audiobook" => Ok(Format::Audiobook),
            other => Err(TypesError::UnknownFormat(other.to_string())),
        }
    }
}

/// How tier thresholds are measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierCalculationMode {
    /// Tiers reset to zero at the start of every royalty period.
    #[default]
    Period,
    /// Tiers apply against cumulative sales since the title's first sale.
    Lifetime,
}

impl TierCalculationMode {
    /// Storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            TierCalculationMode::Period => "period",
            TierCalculationMode::Lifetime => "lifetime",
        }
    }
}

impl fmt::Display for TierCalculationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierCalculationMode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "period" => Ok(TierCalculationMode::Period),
            "lifetime" => Ok(TierCalculationMode::Lifetime),
            other => Err(TypesError::UnknownMode(other.to_string())),
        }
    }
}

/// One rate band of a tier schedule, covering `[min_quantity, max_quantity)`.
///
/// `max_quantity = None` is the open-ended final tier. Tiers are immutable
/// once a statement has been generated against them; edits create new tiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTier {
    pub id: TierId,
    pub format: Format,
    pub min_quantity: Decimal,
    pub max_quantity: Option<Decimal>,
    /// Fraction of revenue, e.g. `0.10` for 10%.
    pub rate: Decimal,
}

impl ContractTier {
    /// Whether this tier has no upper bound.
    pub fn is_open_ended(&self) -> bool {
        self.max_quantity.is_none()
    }
}

/// Ownership share of a title held by one co-author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoAuthorSplit {
    pub owner_id: OwnerId,
    /// Percentage, e.g. `40` for 40%.
    pub share_pct: Decimal,
}

/// A royalty contract for one title.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub tenant_id: TenantId,
    pub title_id: TitleId,
    pub tier_calculation_mode: TierCalculationMode,
    /// Tiers for every format, in stored order.
    pub tiers: Vec<ContractTier>,
    pub advance: AdvanceState,
    /// Empty when the title has a single, implicit owner outside the split model.
    pub splits: Vec<CoAuthorSplit>,
}

impl Contract {
    /// Tier schedule for one format, in stored order. Not re-sorted: ordering
    /// violations must surface in validation rather than be repaired here.
    pub fn schedule(&self, format: Format) -> Vec<ContractTier> {
        self.tiers
            .iter()
            .filter(|t| t.format == format)
            .cloned()
            .collect()
    }

    /// Formats that carry a tier schedule, in `Format` order.
    pub fn formats(&self) -> Vec<Format> {
        self.tiers
            .iter()
            .map(|t| t.format)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
