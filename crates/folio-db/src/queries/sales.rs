//! Netted sales queries.
//!
//! Ingestion from sales channels happens elsewhere; these functions record
//! rows, track how far each (title, format) feed has been loaded, and answer
//! the two reads the engine needs.

use chrono::NaiveDate;
use folio_types::{Format, SalesPeriodTotals, TenantId, TitleId};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::{parse_date, parse_decimal, Result};

/// Insert one netted sales row. Returns are negative quantities.
pub fn insert(
    conn: &Connection,
    tenant_id: TenantId,
    title_id: TitleId,
    format: Format,
    sale_date: NaiveDate,
    quantity: i64,
    revenue: Decimal,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sales (tenant_id, title_id, format, sale_date, quantity, revenue)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            tenant_id as i64,
            title_id as i64,
            format.as_str(),
            sale_date.to_string(),
            quantity,
            revenue.to_string(),
        ],
    )?;
    Ok(())
}

/// Record that sales are complete through `date`. Never moves backwards.
pub fn mark_loaded_through(
    conn: &Connection,
    tenant_id: TenantId,
    title_id: TitleId,
    format: Format,
    date: NaiveDate,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sales_coverage (tenant_id, title_id, format, loaded_through)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (tenant_id, title_id, format)
         DO UPDATE SET loaded_through = MAX(loaded_through, excluded.loaded_through)",
        rusqlite::params![
            tenant_id as i64,
            title_id as i64,
            format.as_str(),
            date.to_string(),
        ],
    )?;
    Ok(())
}

/// Date through which sales are loaded, if any.
pub fn loaded_through(
    conn: &Connection,
    tenant_id: TenantId,
    title_id: TitleId,
    format: Format,
) -> Result<Option<NaiveDate>> {
    conn.query_row(
        "SELECT loaded_through FROM sales_coverage
         WHERE tenant_id = ?1 AND title_id = ?2 AND format = ?3",
        rusqlite::params![tenant_id as i64, title_id as i64, format.as_str()],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .map(|d| parse_date("loaded_through", &d))
    .transpose()
}

/// Net quantity and revenue for `[start, end]` inclusive.
///
/// Revenue is summed in Rust to keep exact decimal precision.
pub fn period_totals(
    conn: &Connection,
    tenant_id: TenantId,
    title_id: TitleId,
    format: Format,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SalesPeriodTotals> {
    let mut stmt = conn.prepare(
        "SELECT quantity, revenue FROM sales
         WHERE tenant_id = ?1 AND title_id = ?2 AND format = ?3
           AND sale_date >= ?4 AND sale_date <= ?5",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                tenant_id as i64,
                title_id as i64,
                format.as_str(),
                start.to_string(),
                end.to_string(),
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut totals = SalesPeriodTotals::default();
    for (quantity, revenue) in rows {
        totals.net_quantity += Decimal::from(quantity);
        totals.net_revenue += parse_decimal("revenue", &revenue)?;
    }
    Ok(totals)
}

/// Signed net units strictly before `before`. Returns are included, so the
/// total can be negative.
pub fn net_units_before(
    conn: &Connection,
    tenant_id: TenantId,
    title_id: TitleId,
    format: Format,
    before: NaiveDate,
) -> Result<Decimal> {
    let net: i64 = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM sales
         WHERE tenant_id = ?1 AND title_id = ?2 AND format = ?3 AND sale_date < ?4",
        rusqlite::params![
            tenant_id as i64,
            title_id as i64,
            format.as_str(),
            before.to_string(),
        ],
        |row| row.get(0),
    )?;
    Ok(Decimal::from(net))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn test_period_totals_net_returns() {
        let conn = test_db();
        insert(&conn, 1, 10, Format::Physical, date(2026, 1, 5), 100, dec!(1999.00)).expect("sale");
        insert(&conn, 1, 10, Format::Physical, date(2026, 2, 5), -20, dec!(-399.80)).expect("return");
        insert(&conn, 1, 10, Format::Physical, date(2026, 7, 1), 999, dec!(1)).expect("outside");
        insert(&conn, 1, 10, Format::Ebook, date(2026, 1, 5), 50, dec!(450)).expect("other format");
        insert(&conn, 2, 10, Format::Physical, date(2026, 1, 5), 70, dec!(700)).expect("other tenant");

        let totals =
            period_totals(&conn, 1, 10, Format::Physical, date(2026, 1, 1), date(2026, 6, 30))
                .expect("totals");
        assert_eq!(totals.net_quantity, dec!(80));
        assert_eq!(totals.net_revenue, dec!(1599.20));
    }

    #[test]
    fn test_period_bounds_are_inclusive() {
        let conn = test_db();
        insert(&conn, 1, 10, Format::Ebook, date(2026, 1, 1), 1, dec!(5)).expect("first day");
        insert(&conn, 1, 10, Format::Ebook, date(2026, 6, 30), 2, dec!(10)).expect("last day");
        let totals = period_totals(&conn, 1, 10, Format::Ebook, date(2026, 1, 1), date(2026, 6, 30))
            .expect("totals");
        assert_eq!(totals.net_quantity, dec!(3));
    }

    #[test]
    fn test_net_units_before_keeps_returns() {
        let conn = test_db();
        assert_eq!(
            net_units_before(&conn, 1, 10, Format::Physical, date(2026, 2, 1)).expect("empty"),
            Decimal::ZERO
        );
        insert(&conn, 1, 10, Format::Physical, date(2025, 11, 3), 500, dec!(5000)).expect("sale");
        insert(&conn, 1, 10, Format::Physical, date(2025, 12, 3), 100, dec!(1000)).expect("sale");
        insert(&conn, 1, 10, Format::Physical, date(2025, 12, 9), -300, dec!(-3000)).expect("return");
        insert(&conn, 1, 10, Format::Physical, date(2026, 1, 2), 40, dec!(400)).expect("sale");
        insert(&conn, 1, 10, Format::Ebook, date(2025, 12, 3), 70, dec!(700)).expect("other format");

        let net = net_units_before(&conn, 1, 10, Format::Physical, date(2026, 2, 1)).expect("net");
        assert_eq!(net, dec!(340));

        // Strictly before: January sales are excluded on 2026-01-02 itself.
        let net = net_units_before(&conn, 1, 10, Format::Physical, date(2026, 1, 2)).expect("net");
        assert_eq!(net, dec!(300));
    }

    #[test]
    fn test_net_units_before_can_go_negative() {
        let conn = test_db();
        insert(&conn, 1, 10, Format::Ebook, date(2025, 3, 3), -12, dec!(-120)).expect("return");
        let net = net_units_before(&conn, 1, 10, Format::Ebook, date(2026, 1, 1)).expect("net");
        assert_eq!(net, dec!(-12));
    }

    #[test]
    fn test_coverage_only_moves_forward() {
        let conn = test_db();
        assert_eq!(loaded_through(&conn, 1, 10, Format::Audiobook).expect("none"), None);
        mark_loaded_through(&conn, 1, 10, Format::Audiobook, date(2026, 6, 30)).expect("mark");
        mark_loaded_through(&conn, 1, 10, Format::Audiobook, date(2026, 3, 31)).expect("older");
        assert_eq!(
            loaded_through(&conn, 1, 10, Format::Audiobook).expect("coverage"),
            Some(date(2026, 6, 30))
        );
    }
}
