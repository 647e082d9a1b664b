//! Tier schedule validation and allocation.
//!
//! A period's units occupy an interval of quantity positions:
//!
//! ```text
//! period mode:   [0, q)
//! lifetime mode: [lifetime_before, lifetime_before + q)
//! ```
//!
//! Each tier `[min, max)` receives the overlap of that interval with its own
//! range. Revenue is spread over tiers in proportion to units, which assumes
//! a uniform unit price across the period:
//!
//! ```text
//! slice_royalty = (units_in_tier / q) * period_revenue * rate
//! ```
//!
//! Slice royalties are kept at full precision until the format total is
//! rounded to [`CURRENCY_SCALE`]. Each slice is then truncated to the cent
//! and the leftover cents go to the slices with the largest truncated
//! remainders, so slices sum to the format royalty and never carry the
//! opposite sign.

use folio_types::{
    ContractTier, QuantityInterval, TierBreakdown, TierCalculationMode, CURRENCY_SCALE,
};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{ConfigurationError, Result, RoyaltyError};

/// Rounding applied to currency amounts.
pub const CURRENCY_ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Round an amount to the smallest currency unit, always carrying two
/// decimal places.
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(CURRENCY_SCALE, CURRENCY_ROUNDING);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// Result of distributing one format's period sales over its schedule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TierAllocation {
    pub breakdowns: Vec<TierBreakdown>,
    /// Format royalty, rounded to the currency scale.
    pub royalty: Decimal,
}

impl TierAllocation {
    /// Total units placed across all tiers.
    pub fn units(&self) -> Decimal {
        self.breakdowns.iter().map(|b| b.units).sum()
    }
}

/// Validate that a schedule is non-empty, starts at zero, is sorted,
/// contiguous, non-overlapping, single-format, and ends open-ended.
///
/// # Errors
///
/// Returns the first [`ConfigurationError`] found, scanning in stored order.
pub fn validate_schedule(tiers: &[ContractTier]) -> std::result::Result<(), ConfigurationError> {
    let first = tiers.first().ok_or(ConfigurationError::EmptySchedule)?;
    if !first.min_quantity.is_zero() {
        return Err(ConfigurationError::FirstTierNotZero {
            tier_id: first.id,
            min_quantity: first.min_quantity,
        });
    }

    for tier in tiers {
        if tier.format != first.format {
            return Err(ConfigurationError::MixedFormats {
                tier_id: tier.id,
                expected: first.format,
                found: tier.format,
            });
        }
        if tier.rate < Decimal::ZERO || tier.rate > Decimal::ONE {
            return Err(ConfigurationError::InvalidRate {
                tier_id: tier.id,
                rate: tier.rate,
            });
        }
        if let Some(max) = tier.max_quantity {
            if max <= tier.min_quantity {
                return Err(ConfigurationError::EmptyRange { tier_id: tier.id });
            }
        }
    }

    for pair in tiers.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.min_quantity < prev.min_quantity {
            return Err(ConfigurationError::Unsorted { tier_id: next.id });
        }
        let Some(prev_max) = prev.max_quantity else {
            return Err(ConfigurationError::UnboundedBeforeLast { tier_id: prev.id });
        };
        if next.min_quantity < prev_max {
            return Err(ConfigurationError::Overlap {
                previous: prev.id,
                next: next.id,
            });
        }
        if next.min_quantity > prev_max {
            return Err(ConfigurationError::Gap {
                previous: prev.id,
                next: next.id,
            });
        }
    }

    // Non-empty was checked above.
    if let Some(last) = tiers.last() {
        if !last.is_open_ended() {
            return Err(ConfigurationError::BoundedFinalTier { tier_id: last.id });
        }
    }

    Ok(())
}

/// Distribute a period's net units and revenue across a tier schedule.
///
/// A zero or negative `period_quantity` yields an empty allocation with zero
/// royalty in either mode and consumes no lifetime position. A negative
/// `lifetime_before` is treated as zero.
///
/// # Errors
///
/// - [`RoyaltyError::Configuration`] if the schedule fails [`validate_schedule`]
/// - [`RoyaltyError::Overflow`] if a slice royalty is not representable
pub fn allocate(
    period_quantity: Decimal,
    period_revenue: Decimal,
    tiers: &[ContractTier],
    mode: TierCalculationMode,
    lifetime_before: Decimal,
) -> Result<TierAllocation> {
    validate_schedule(tiers)?;

    if period_quantity <= Decimal::ZERO {
        return Ok(TierAllocation::default());
    }

    let start = match mode {
        TierCalculationMode::Period => Decimal::ZERO,
        TierCalculationMode::Lifetime => lifetime_before.max(Decimal::ZERO),
    };
    let end = start
        .checked_add(period_quantity)
        .ok_or(RoyaltyError::Overflow)?;

    let mut slices: Vec<(TierBreakdown, Decimal)> = Vec::new();
    for tier in tiers {
        let lo = start.max(tier.min_quantity);
        let hi = tier.max_quantity.map_or(end, |max| end.min(max));
        if hi <= lo {
            continue;
        }
        let units = hi - lo;
        let raw = slice_royalty(units, period_quantity, period_revenue, tier.rate)?;

        tracing::debug!(
            tier_id = tier.id,
            %units,
            rate = %tier.rate,
            royalty = %raw,
            "tier slice"
        );

        let lifetime_interval = match mode {
            TierCalculationMode::Period => None,
            TierCalculationMode::Lifetime => Some(QuantityInterval { start: lo, end: hi }),
        };
        slices.push((
            TierBreakdown {
                tier_id: tier.id,
                rate: tier.rate,
                units,
                royalty: Decimal::ZERO,
                lifetime_interval,
            },
            raw,
        ));
    }

    let raw_total = slices
        .iter()
        .try_fold(Decimal::ZERO, |acc, (_, raw)| acc.checked_add(*raw))
        .ok_or(RoyaltyError::Overflow)?;
    let royalty = round_currency(raw_total);

    let raws: Vec<Decimal> = slices.iter().map(|(_, raw)| *raw).collect();
    let cents = distribute_cents(&raws, raw_total, royalty);
    let breakdowns = slices
        .into_iter()
        .zip(cents)
        .map(|((mut breakdown, _), cents)| {
            breakdown.royalty = cents;
            breakdown
        })
        .collect();

    Ok(TierAllocation {
        breakdowns,
        royalty,
    })
}

/// Round slice royalties to the cent so they sum to `royalty`.
///
/// All slices share the sign of `raw_total` (units and rates are
/// non-negative), so the work happens on magnitudes: truncate each, then
/// hand one cent at a time to the largest remainders, earlier tiers first
/// on ties. The number of cents handed out never exceeds the number of
/// slices with a non-zero remainder.
fn distribute_cents(raws: &[Decimal], raw_total: Decimal, royalty: Decimal) -> Vec<Decimal> {
    let negative = raw_total < Decimal::ZERO;
    let cent = Decimal::new(1, CURRENCY_SCALE);

    let magnitudes: Vec<Decimal> = raws.iter().map(|raw| raw.abs()).collect();
    let mut rounded: Vec<Decimal> = magnitudes
        .iter()
        .map(|m| {
            let mut truncated = m.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero);
            truncated.rescale(CURRENCY_SCALE);
            truncated
        })
        .collect();

    let mut order: Vec<usize> = (0..raws.len()).collect();
    order.sort_by(|&a, &b| {
        let rem_a = magnitudes[a] - rounded[a];
        let rem_b = magnitudes[b] - rounded[b];
        rem_b.cmp(&rem_a).then(a.cmp(&b))
    });

    let mut shortfall = royalty.abs() - rounded.iter().copied().sum::<Decimal>();
    for i in order {
        if shortfall < cent {
            break;
        }
        rounded[i] += cent;
        shortfall -= cent;
    }

    rounded
        .into_iter()
        .map(|m| if negative && !m.is_zero() { -m } else { m })
        .collect()
}

/// `(units / quantity) * revenue * rate`, multiplied before dividing to keep
/// precision.
fn slice_royalty(
    units: Decimal,
    quantity: Decimal,
    revenue: Decimal,
    rate: Decimal,
) -> Result<Decimal> {
    revenue
        .checked_mul(units)
        .and_then(|v| v.checked_div(quantity))
        .and_then(|v| v.checked_mul(rate))
        .ok_or(RoyaltyError::Overflow)
}

/// Index of the tier containing `position`.
pub fn tier_index_at(tiers: &[ContractTier], position: Decimal) -> Option<usize> {
    tiers.iter().position(|t| {
        position >= t.min_quantity && t.max_quantity.map_or(true, |max| position < max)
    })
}

/// Lower bound of the first tier starting strictly after `position`.
pub fn next_tier_threshold(tiers: &[ContractTier], position: Decimal) -> Option<Decimal> {
    tiers
        .iter()
        .map(|t| t.min_quantity)
        .find(|min| *min > position)
}
