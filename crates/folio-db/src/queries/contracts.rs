//! Contract, tier, and co-author split queries.

use folio_types::{
    AdvanceState, CoAuthorSplit, Contract, ContractId, ContractTier, TenantId,
};
use rusqlite::{Connection, OptionalExtension};

use crate::{parse_decimal, DbError, Result};

/// Insert a contract with its tiers and splits.
///
/// The caller is responsible for wrapping this in a transaction when
/// atomicity with other writes matters.
pub fn insert(conn: &Connection, contract: &Contract) -> Result<()> {
    conn.execute(
        "INSERT INTO contracts
         (contract_id, tenant_id, title_id, tier_mode, advance_total, advance_recouped)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            contract.id as i64,
            contract.tenant_id as i64,
            contract.title_id as i64,
            contract.tier_calculation_mode.as_str(),
            contract.advance.total.to_string(),
            contract.advance.recouped.to_string(),
        ],
    )?;

    let mut tier_stmt = conn.prepare(
        "INSERT INTO contract_tiers (tier_id, contract_id, format, min_quantity, max_quantity, rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for tier in &contract.tiers {
        tier_stmt.execute(rusqlite::params![
            tier.id as i64,
            contract.id as i64,
            tier.format.as_str(),
            tier.min_quantity.to_string(),
            tier.max_quantity.map(|m| m.to_string()),
            tier.rate.to_string(),
        ])?;
    }

    let mut split_stmt = conn.prepare(
        "INSERT INTO contract_splits (contract_id, owner_id, share_pct) VALUES (?1, ?2, ?3)",
    )?;
    for split in &contract.splits {
        split_stmt.execute(rusqlite::params![
            contract.id as i64,
            split.owner_id as i64,
            split.share_pct.to_string(),
        ])?;
    }

    Ok(())
}

/// Load a contract, scoped to its tenant.
pub fn get(conn: &Connection, tenant_id: TenantId, contract_id: ContractId) -> Result<Contract> {
    let row = conn
        .query_row(
            "SELECT title_id, tier_mode, advance_total, advance_recouped
             FROM contracts WHERE contract_id = ?1 AND tenant_id = ?2",
            rusqlite::params![contract_id as i64, tenant_id as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("contract {contract_id}")))?;

    let (title_id, mode, total, recouped) = row;
    Ok(Contract {
        id: contract_id,
        tenant_id,
        title_id: title_id as u64,
        tier_calculation_mode: mode
            .parse()
            .map_err(|e| DbError::Serialization(format!("tier_mode: {e}")))?,
        tiers: tiers(conn, contract_id)?,
        advance: AdvanceState::new(
            parse_decimal("advance_total", &total)?,
            parse_decimal("advance_recouped", &recouped)?,
        ),
        splits: splits(conn, contract_id)?,
    })
}

/// Tiers in insertion order. Not re-sorted, so authoring mistakes surface in
/// schedule validation.
fn tiers(conn: &Connection, contract_id: ContractId) -> Result<Vec<ContractTier>> {
    let mut stmt = conn.prepare(
        "SELECT tier_id, format, min_quantity, max_quantity, rate
         FROM contract_tiers WHERE contract_id = ?1 ORDER BY tier_id",
    )?;
    let rows = stmt
        .query_map([contract_id as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, format, min, max, rate)| {
            Ok(ContractTier {
                id: id as u64,
                format: format
                    .parse()
                    .map_err(|e| DbError::Serialization(format!("format: {e}")))?,
                min_quantity: parse_decimal("min_quantity", &min)?,
                max_quantity: max
                    .as_deref()
                    .map(|m| parse_decimal("max_quantity", m))
                    .transpose()?,
                rate: parse_decimal("rate", &rate)?,
            })
        })
        .collect()
}

fn splits(conn: &Connection, contract_id: ContractId) -> Result<Vec<CoAuthorSplit>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, share_pct FROM contract_splits
         WHERE contract_id = ?1 ORDER BY owner_id",
    )?;
    let rows = stmt
        .query_map([contract_id as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(owner_id, share)| {
            Ok(CoAuthorSplit {
                owner_id: owner_id as u64,
                share_pct: parse_decimal("share_pct", &share)?,
            })
        })
        .collect()
}

/// `(tenant_id, contract_id)` pairs, optionally restricted to one tenant.
pub fn list_ids(conn: &Connection, tenant_id: Option<TenantId>) -> Result<Vec<(TenantId, ContractId)>> {
    let mut stmt = conn.prepare(
        "SELECT tenant_id, contract_id FROM contracts
         WHERE ?1 IS NULL OR tenant_id = ?1
         ORDER BY tenant_id, contract_id",
    )?;
    let rows = stmt
        .query_map([tenant_id.map(|t| t as i64)], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Advance state row used by the commit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceRow {
    pub tenant_id: TenantId,
    pub state: AdvanceState,
    pub version: i64,
}

/// Read a contract's advance state and version.
pub fn advance_state(conn: &Connection, contract_id: ContractId) -> Result<AdvanceRow> {
    let (tenant_id, total, recouped, version) = conn
        .query_row(
            "SELECT tenant_id, advance_total, advance_recouped, advance_version
             FROM contracts WHERE contract_id = ?1",
            [contract_id as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("contract {contract_id}")))?;

    Ok(AdvanceRow {
        tenant_id: tenant_id as u64,
        state: AdvanceState::new(
            parse_decimal("advance_total", &total)?,
            parse_decimal("advance_recouped", &recouped)?,
        ),
        version,
    })
}

/// Write a new advance state if the row is still at `expected_version`.
///
/// # Errors
///
/// - [`DbError::Conflict`] if another writer bumped the version
pub fn update_advance(
    conn: &Connection,
    contract_id: ContractId,
    state: &AdvanceState,
    expected_version: i64,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE contracts
         SET advance_recouped = ?1, advance_version = advance_version + 1
         WHERE contract_id = ?2 AND advance_version = ?3",
        rusqlite::params![
            state.recouped.to_string(),
            contract_id as i64,
            expected_version,
        ],
    )?;
    if updated == 0 {
        return Err(DbError::Conflict { contract_id });
    }
    Ok(())
}
