//! Royalty periods and net sales totals.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::TypesError;

/// A royalty period. Both bounds are inclusive calendar dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoyaltyPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RoyaltyPeriod {
    /// Build a period, rejecting an end date before the start.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TypesError> {
        if end < start {
            return Err(TypesError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }
}

impl std::fmt::Display for RoyaltyPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Net (sales minus returns) quantity and revenue for one format in one
/// period. Either value may be negative in a return-heavy period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesPeriodTotals {
    pub net_quantity: Decimal,
    pub net_revenue: Decimal,
}

impl SalesPeriodTotals {
    pub fn new(net_quantity: Decimal, net_revenue: Decimal) -> Self {
        Self {
            net_quantity,
            net_revenue,
        }
    }
}
