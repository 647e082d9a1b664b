//! Co-author split allocation.
//!
//! A royalty amount is divided among a title's co-owners by ownership
//! percentage. Shares must total exactly 100.
//!
//! ## Remainder rule
//!
//! Owners are ordered by ascending owner id. Every owner except the last is
//! paid `amount * share_pct / 100` truncated to the currency scale; the
//! owner with the highest id receives `amount - sum(others)`. The sum of
//! allocations therefore equals `amount` exactly, all rounding lands on one
//! reproducible owner, and truncation keeps that remainder non-negative.

use std::collections::BTreeSet;

use folio_types::{CoAuthorSplit, OwnerAllocation, CURRENCY_SCALE, FULL_OWNERSHIP_PCT};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{ConfigurationError, Result, RoyaltyError};

/// Validate a co-author split configuration.
///
/// # Errors
///
/// - [`ConfigurationError::NoOwners`] if the list is empty
/// - [`ConfigurationError::DuplicateOwner`] if an owner appears twice
/// - [`ConfigurationError::NonPositiveShare`] if a share is zero or negative
/// - [`ConfigurationError::SharesNotHundred`] if shares do not sum to 100
pub fn validate_shares(owners: &[CoAuthorSplit]) -> std::result::Result<(), ConfigurationError> {
    if owners.is_empty() {
        return Err(ConfigurationError::NoOwners);
    }

    let mut seen = BTreeSet::new();
    for owner in owners {
        if !seen.insert(owner.owner_id) {
            return Err(ConfigurationError::DuplicateOwner {
                owner_id: owner.owner_id,
            });
        }
        if owner.share_pct <= Decimal::ZERO {
            return Err(ConfigurationError::NonPositiveShare {
                owner_id: owner.owner_id,
                share_pct: owner.share_pct,
            });
        }
    }

    let total: Decimal = owners.iter().map(|o| o.share_pct).sum();
    if total != Decimal::from(FULL_OWNERSHIP_PCT) {
        return Err(ConfigurationError::SharesNotHundred { total });
    }
    Ok(())
}

/// Split `amount` across `owners`, returned in ascending owner id order.
///
/// # Errors
///
/// - [`RoyaltyError::Configuration`] if the shares fail [`validate_shares`]
/// - [`RoyaltyError::NegativeAmount`] if `amount` is negative
/// - [`RoyaltyError::Overflow`] on arithmetic overflow
pub fn split(amount: Decimal, owners: &[CoAuthorSplit]) -> Result<Vec<OwnerAllocation>> {
    validate_shares(owners)?;
    if amount < Decimal::ZERO {
        return Err(RoyaltyError::NegativeAmount(amount));
    }

    if let [only] = owners {
        return Ok(vec![OwnerAllocation {
            owner_id: only.owner_id,
            share_pct: only.share_pct,
            amount,
        }]);
    }

    let mut ordered: Vec<&CoAuthorSplit> = owners.iter().collect();
    ordered.sort_by_key(|o| o.owner_id);

    let hundred = Decimal::from(FULL_OWNERSHIP_PCT);
    let last = ordered.len() - 1;
    let mut distributed = Decimal::ZERO;
    let mut allocations = Vec::with_capacity(ordered.len());

    for (i, owner) in ordered.into_iter().enumerate() {
        let share = if i == last {
            // Remainder to the highest owner id.
            amount - distributed
        } else {
            amount
                .checked_mul(owner.share_pct)
                .and_then(|v| v.checked_div(hundred))
                .ok_or(RoyaltyError::Overflow)?
                .round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero)
        };
        distributed += share;
        allocations.push(OwnerAllocation {
            owner_id: owner.owner_id,
            share_pct: owner.share_pct,
            amount: share,
        });
    }

    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn owner(owner_id: u64, share_pct: Decimal) -> CoAuthorSplit {
        CoAuthorSplit {
            owner_id,
            share_pct,
        }
    }

    #[test]
    fn test_single_owner_short_circuit() {
        let allocations = split(dec!(1234.57), &[owner(7, dec!(100))]).expect("split");
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].owner_id, 7);
        assert_eq!(allocations[0].amount, dec!(1234.57));
    }

    #[test]
    fn test_even_split() {
        let allocations =
            split(dec!(1000), &[owner(1, dec!(60)), owner(2, dec!(40))]).expect("split");
        assert_eq!(allocations[0].amount, dec!(600));
        assert_eq!(allocations[1].amount, dec!(400));
    }

    #[test]
    fn test_remainder_goes_to_highest_owner_id() {
        // Supplied out of order; owner 9 is last after sorting.
        let owners = [
            owner(9, dec!(33.34)),
            owner(2, dec!(33.33)),
            owner(5, dec!(33.33)),
        ];
        let allocations = split(dec!(100.00), &owners).expect("split");
        let ids: Vec<_> = allocations.iter().map(|a| a.owner_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(allocations[0].amount, dec!(33.33));
        assert_eq!(allocations[1].amount, dec!(33.33));
        assert_eq!(allocations[2].amount, dec!(33.34));
        let total: Decimal = allocations.iter().map(|a| a.amount).sum();
        assert_eq!(total, dec!(100.00));
    }

    #[test]
    fn test_indivisible_cent() {
        let owners = [owner(1, dec!(50)), owner(2, dec!(50))];
        let allocations = split(dec!(0.01), &owners).expect("split");
        assert_eq!(allocations[0].amount, Decimal::ZERO);
        assert_eq!(allocations[1].amount, dec!(0.01));
    }

    #[test]
    fn test_zero_amount() {
        let owners = [owner(1, dec!(50)), owner(2, dec!(50))];
        let allocations = split(Decimal::ZERO, &owners).expect("split");
        assert!(allocations.iter().all(|a| a.amount.is_zero()));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let err = split(dec!(-1), &[owner(1, dec!(100))]).expect_err("negative");
        assert!(matches!(err, RoyaltyError::NegativeAmount(_)));
    }

    #[test]
    fn test_validate_shares_total() {
        let err = validate_shares(&[owner(1, dec!(60)), owner(2, dec!(30))]).expect_err("90%");
        assert_eq!(err, ConfigurationError::SharesNotHundred { total: dec!(90) });
    }

    #[test]
    fn test_validate_shares_duplicates_and_zero() {
        assert_eq!(
            validate_shares(&[owner(1, dec!(50)), owner(1, dec!(50))]),
            Err(ConfigurationError::DuplicateOwner { owner_id: 1 })
        );
        assert!(matches!(
            validate_shares(&[owner(1, dec!(100)), owner(2, dec!(0))]),
            Err(ConfigurationError::NonPositiveShare { owner_id: 2, .. })
        ));
        assert_eq!(validate_shares(&[]), Err(ConfigurationError::NoOwners));
    }

    #[test]
    fn test_single_owner_must_still_hold_everything() {
        assert!(split(dec!(10), &[owner(1, dec!(90))]).is_err());
    }

    fn shares_strategy() -> impl Strategy<Value = Vec<CoAuthorSplit>> {
        // Up to six owners with basis-point shares that total 100.00%.
        prop::collection::vec(1u32..5_000, 1..6).prop_map(|weights| {
            let total: u32 = weights.iter().sum();
            let mut bps: Vec<u32> = weights.iter().map(|w| w * 10_000 / total).collect();
            let assigned: u32 = bps.iter().sum();
            if let Some(first) = bps.first_mut() {
                *first += 10_000 - assigned;
            }
            bps.into_iter()
                .enumerate()
                .filter(|(_, b)| *b > 0)
                .map(|(i, b)| owner(i as u64 + 1, Decimal::new(i64::from(b), 2)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn allocations_sum_exactly(
            cents in 0i64..1_000_000_000,
            owners in shares_strategy(),
        ) {
            prop_assume!(validate_shares(&owners).is_ok());
            let amount = Decimal::new(cents, 2);
            let allocations = split(amount, &owners).expect("split");
            let total: Decimal = allocations.iter().map(|a| a.amount).sum();
            prop_assert_eq!(total, amount);
            prop_assert!(allocations.iter().all(|a| a.amount >= Decimal::ZERO));
            prop_assert_eq!(split(amount, &owners).expect("again"), allocations);
        }
    }
}
