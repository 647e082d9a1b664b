//! Advance balance carried on a contract.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cash advance paid against future royalties, and how much of it has been
/// withheld from royalties so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceState {
    pub total: Decimal,
    pub recouped: Decimal,
}

impl AdvanceState {
    pub fn new(total: Decimal, recouped: Decimal) -> Self {
        Self { total, recouped }
    }

    /// Outstanding balance still to be recouped, never negative.
    pub fn remaining(&self) -> Decimal {
        (self.total - self.recouped).max(Decimal::ZERO)
    }

    pub fn is_fully_recouped(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_remaining() {
        let state = AdvanceState::new(dec!(1000), dec!(900));
        assert_eq!(state.remaining(), dec!(100));
        assert!(!state.is_fully_recouped());
    }

    #[test]
    fn test_remaining_never_negative() {
        let state = AdvanceState::new(dec!(1000), dec!(1200));
        assert_eq!(state.remaining(), Decimal::ZERO);
        assert!(state.is_fully_recouped());
    }

    #[test]
    fn test_no_advance() {
        assert!(AdvanceState::default().is_fully_recouped());
    }
}
