//! Advance recoupment.
//!
//! Royalties are withheld until the advance paid up front is repaid:
//!
//! ```text
//! recouped_this_period = clamp(gross, 0, advance.total - advance.recouped)
//! net_payable_raw      = gross - recouped_this_period
//! net_payable          = max(net_payable_raw, 0)
//! ```
//!
//! This is the only cross-period mutable state in a calculation. The
//! returned [`Recoupment::new_state`] must be committed together with the
//! calculation record (see [`crate::store::LedgerStore`]).

use folio_types::{AdvanceState, RecoupmentSummary};
use rust_decimal::Decimal;

/// Outcome of netting one period's gross royalty against an advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recoupment {
    pub gross: Decimal,
    pub previous: AdvanceState,
    pub recouped_this_period: Decimal,
    /// Pre-floor value, retained for audit.
    pub net_payable_raw: Decimal,
    pub net_payable: Decimal,
    pub new_state: AdvanceState,
}

impl Recoupment {
    /// Record-level view of this recoupment.
    pub fn summary(&self) -> RecoupmentSummary {
        RecoupmentSummary {
            advance_total: self.previous.total,
            recouped_before: self.previous.recouped,
            recouped_this_period: self.recouped_this_period,
            recouped_after: self.new_state.recouped,
            net_payable_raw: self.net_payable_raw,
            net_payable: self.net_payable,
        }
    }
}

/// Net `gross` against the outstanding advance in `state`.
///
/// Recoupment is capped at the remaining balance; reaching the end of the
/// advance is logged, not treated as an error. A zero or negative gross
/// recoups nothing.
pub fn apply(gross: Decimal, state: AdvanceState) -> Recoupment {
    let remaining = state.remaining();
    let recouped_this_period = gross.min(remaining).max(Decimal::ZERO);

    if gross > remaining && !remaining.is_zero() {
        tracing::info!(
            %gross,
            %remaining,
            advance_total = %state.total,
            "advance fully recouped; recoupment capped at remaining balance"
        );
    }

    let net_payable_raw = gross - recouped_this_period;
    let new_state = AdvanceState {
        total: state.total,
        recouped: state.recouped + recouped_this_period,
    };

    Recoupment {
        gross,
        previous: state,
        recouped_this_period,
        net_payable_raw,
        net_payable: net_payable_raw.max(Decimal::ZERO),
        new_state,
    }
}
