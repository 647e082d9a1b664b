//! Lifetime sales position resolver.
//!
//! In lifetime mode, tiers are measured against every unit sold before the
//! period began. The position is clamped per royalty period: a period whose
//! net units are negative contributes nothing, and returns never pull the
//! position below what an earlier committed period already consumed. The
//! engine passes the latest committed position as a [`LifetimeAnchor`]; the
//! resolver adds the net units sold between that anchor and the period
//! start, floored at zero.
//!
//! ```text
//! no anchor:  max(0, net(.., start))
//! anchored:   anchor.units + max(0, net(anchor.through + 1 .. start))
//! ```

use chrono::NaiveDate;
use folio_types::{Format, TenantId, TitleId};
use rust_decimal::Decimal;

use crate::store::{SalesStore, StoreAccess};
use crate::Result;

/// Lifetime position already consumed by a committed calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifetimeAnchor {
    /// Last day of the committed period.
    pub through: NaiveDate,
    /// The committed `units_after` for the format.
    pub units: Decimal,
}

/// Resolves cumulative units sold before a period start.
pub struct LifetimeSalesResolver<'a, S: SalesStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: SalesStore + ?Sized> LifetimeSalesResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Cumulative net units for a title and format strictly before
    /// `period_start`, floored at zero, with no committed history.
    ///
    /// Interactive and elevated access run the same query; `access` only
    /// selects the credential the store uses.
    pub fn resolve(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        period_start: NaiveDate,
    ) -> Result<Decimal> {
        self.resolve_from(access, tenant_id, title_id, format, period_start, None)
    }

    /// Position before `period_start`, continuing from a committed anchor.
    ///
    /// An anchor that does not end before `period_start` is ignored.
    pub fn resolve_from(
        &self,
        access: &StoreAccess,
        tenant_id: TenantId,
        title_id: TitleId,
        format: Format,
        period_start: NaiveDate,
        anchor: Option<LifetimeAnchor>,
    ) -> Result<Decimal> {
        let net_before = |date| {
            self.store
                .lifetime_sales_before(access, tenant_id, title_id, format, date)
        };

        let anchor = anchor.filter(|a| a.through < period_start);
        let position = match anchor {
            None => {
                let net = net_before(period_start)?;
                if net < Decimal::ZERO {
                    tracing::warn!(
                        tenant_id,
                        title_id,
                        %format,
                        %net,
                        "net units before period are negative, flooring at zero"
                    );
                }
                net.max(Decimal::ZERO)
            }
            Some(anchor) => {
                let gap_start = anchor.through.succ_opt().unwrap_or(anchor.through);
                let gap = if gap_start < period_start {
                    net_before(period_start)? - net_before(gap_start)?
                } else {
                    Decimal::ZERO
                };
                if gap < Decimal::ZERO {
                    tracing::warn!(
                        tenant_id,
                        title_id,
                        %format,
                        %gap,
                        through = %anchor.through,
                        "uncalculated sales since last commit are negative, ignoring"
                    );
                }
                anchor.units.max(Decimal::ZERO) + gap.max(Decimal::ZERO)
            }
        };

        tracing::debug!(
            tenant_id,
            title_id,
            %format,
            %position,
            anchored = anchor.is_some(),
            access = access.label(),
            "lifetime position resolved"
        );
        Ok(position)
    }
}
