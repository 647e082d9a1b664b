//! Forward-looking royalty projections.
//!
//! Read-side only. Velocity is the trailing mean of net units over the
//! supplied periods; no seasonality is modelled.
//!
//! ```text
//! velocity          = sum(net_quantity) / n
//! unit_price        = sum(net_revenue) / sum(net_quantity)   (periods with q > 0)
//! annual_royalty(r) = velocity * periods_per_year * unit_price * r
//! crossover         = as_of + ceil((next_tier_min - position) / velocity) periods
//! ```

use chrono::{Months, NaiveDate};
use folio_types::{ContractTier, RoyaltyPeriod, SalesPeriodTotals};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tiers::{round_currency, tier_index_at, validate_schedule};
use crate::{Result, RoyaltyError};

/// Length of one royalty period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodCadence {
    Monthly,
    Quarterly,
    #[default]
    SemiAnnual,
    Annual,
}

impl PeriodCadence {
    pub fn months(&self) -> u32 {
        match self {
            PeriodCadence::Monthly => 1,
            PeriodCadence::Quarterly => 3,
            PeriodCadence::SemiAnnual => 6,
            PeriodCadence::Annual => 12,
        }
    }

    pub fn periods_per_year(&self) -> u32 {
        12 / self.months()
    }
}

/// Projection for one format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub velocity_per_period: Decimal,
    /// `None` when velocity is not positive or there is no higher tier.
    pub estimated_crossover_date: Option<NaiveDate>,
    pub projected_annual_royalty_at_current_rate: Decimal,
    /// `None` when already in the open-ended tier.
    pub projected_annual_royalty_at_next_tier: Option<Decimal>,
    /// Number of periods the velocity was averaged over.
    pub periods_used: usize,
    /// Requested periods left out because their sales are not loaded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unloaded_periods: Vec<RoyaltyPeriod>,
}

/// Project tier crossover and annual royalty from recent sales.
///
/// # Errors
///
/// - [`RoyaltyError::Configuration`] if `tiers` is not a valid schedule
/// - [`RoyaltyError::Overflow`] on arithmetic overflow
pub fn project(
    recent: &[SalesPeriodTotals],
    tiers: &[ContractTier],
    current_position: Decimal,
    as_of: NaiveDate,
    cadence: PeriodCadence,
) -> Result<Projection> {
    validate_schedule(tiers)?;

    let position = current_position.max(Decimal::ZERO);
    let velocity = if recent.is_empty() {
        Decimal::ZERO
    } else {
        let total: Decimal = recent.iter().map(|p| p.net_quantity).sum();
        total / Decimal::from(recent.len())
    };

    let (units, revenue) = recent
        .iter()
        .filter(|p| p.net_quantity > Decimal::ZERO)
        .fold((Decimal::ZERO, Decimal::ZERO), |(u, r), p| {
            (u + p.net_quantity, r + p.net_revenue)
        });
    let unit_price = if units.is_zero() {
        Decimal::ZERO
    } else {
        revenue / units
    };

    // Schedules start at zero and end open-ended, so a tier always matches.
    let current = tier_index_at(tiers, position).unwrap_or(0);
    let next = tiers.get(current + 1);

    let annual_units = velocity.max(Decimal::ZERO) * Decimal::from(cadence.periods_per_year());
    let annual_revenue = annual_units
        .checked_mul(unit_price)
        .ok_or(RoyaltyError::Overflow)?;
    let at_rate = |rate: Decimal| -> Result<Decimal> {
        annual_revenue
            .checked_mul(rate)
            .map(round_currency)
            .ok_or(RoyaltyError::Overflow)
    };

    let current_rate = tiers.get(current).map_or(Decimal::ZERO, |t| t.rate);
    let at_current = at_rate(current_rate)?;
    let at_next = next.map(|t| at_rate(t.rate)).transpose()?;

    let crossover = match next {
        Some(tier) if velocity > Decimal::ZERO => {
            crossover_date(tier.min_quantity - position, velocity, as_of, cadence)
        }
        _ => None,
    };

    Ok(Projection {
        velocity_per_period: velocity,
        estimated_crossover_date: crossover,
        projected_annual_royalty_at_current_rate: at_current,
        projected_annual_royalty_at_next_tier: at_next,
        periods_used: recent.len(),
        unloaded_periods: Vec::new(),
    })
}

fn crossover_date(
    units_needed: Decimal,
    velocity: Decimal,
    as_of: NaiveDate,
    cadence: PeriodCadence,
) -> Option<NaiveDate> {
    let periods = (units_needed / velocity).ceil().to_u32()?;
    let months = periods.checked_mul(cadence.months())?;
    as_of.checked_add_months(Months::new(months))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::Format;
    use rust_decimal_macros::dec;

    fn schedule() -> Vec<ContractTier> {
        vec![
            ContractTier {
                id: 1,
                format: Format::Ebook,
                min_quantity: dec!(0),
                max_quantity: Some(dec!(50000)),
                rate: dec!(0.10),
            },
            ContractTier {
                id: 2,
                format: Format::Ebook,
                min_quantity: dec!(50000),
                max_quantity: None,
                rate: dec!(0.15),
            },
        ]
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).expect("date")
    }

    #[test]
    fn test_projection_with_positive_velocity() {
        let recent = [
            SalesPeriodTotals::new(dec!(4000), dec!(40000)),
            SalesPeriodTotals::new(dec!(6000), dec!(60000)),
        ];
        let p = project(&recent, &schedule(), dec!(35000), as_of(), PeriodCadence::Quarterly)
            .expect("project");

        assert_eq!(p.velocity_per_period, dec!(5000));
        assert_eq!(p.periods_used, 2);
        // 15000 units needed at 5000/quarter => 3 quarters.
        assert_eq!(p.estimated_crossover_date, NaiveDate::from_ymd_opt(2027, 4, 1));
        // 5000 * 4 * $10 * 10%
        assert_eq!(p.projected_annual_royalty_at_current_rate, dec!(20000));
        assert_eq!(p.projected_annual_royalty_at_next_tier, Some(dec!(30000)));
    }

    #[test]
    fn test_partial_period_rounds_up() {
        let recent = [SalesPeriodTotals::new(dec!(4000), dec!(40000))];
        let p = project(&recent, &schedule(), dec!(45000), as_of(), PeriodCadence::Monthly)
            .expect("project");
        // 5000 needed at 4000/month => 2 months.
        assert_eq!(p.estimated_crossover_date, NaiveDate::from_ymd_opt(2026, 9, 1));
    }

    #[test]
    fn test_non_positive_velocity_has_no_crossover() {
        let recent = [
            SalesPeriodTotals::new(dec!(100), dec!(1000)),
            SalesPeriodTotals::new(dec!(-300), dec!(-3000)),
        ];
        let p = project(&recent, &schedule(), dec!(1000), as_of(), PeriodCadence::SemiAnnual)
            .expect("project");
        assert!(p.velocity_per_period < Decimal::ZERO);
        assert_eq!(p.estimated_crossover_date, None);
        assert_eq!(p.projected_annual_royalty_at_current_rate, Decimal::ZERO);

        let p = project(&[], &schedule(), dec!(1000), as_of(), PeriodCadence::SemiAnnual)
            .expect("project");
        assert_eq!(p.velocity_per_period, Decimal::ZERO);
        assert_eq!(p.estimated_crossover_date, None);
    }

    #[test]
    fn test_open_ended_tier_has_no_next() {
        let recent = [SalesPeriodTotals::new(dec!(1000), dec!(10000))];
        let p = project(&recent, &schedule(), dec!(80000), as_of(), PeriodCadence::Annual)
            .expect("project");
        assert_eq!(p.estimated_crossover_date, None);
        assert_eq!(p.projected_annual_royalty_at_next_tier, None);
        assert_eq!(p.projected_annual_royalty_at_current_rate, dec!(1500));
    }

    #[test]
    fn test_cadence() {
        assert_eq!(PeriodCadence::Quarterly.periods_per_year(), 4);
        assert_eq!(PeriodCadence::default().months(), 6);
    }
}
