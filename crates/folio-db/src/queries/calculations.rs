//! Calculation record queries (append-only).

use chrono::{DateTime, Utc};
use folio_royalty::store::StoredCalculation;
use folio_types::{CalculationDocument, ContractId, RoyaltyPeriod, TenantId};
use rusqlite::Connection;

use crate::{DbError, Result};

/// Append a calculation document. Returns its row id.
///
/// # Errors
///
/// - [`DbError::Constraint`] if the (contract, period) already has a record
pub fn insert(
    conn: &Connection,
    document: &CalculationDocument,
    created_at: DateTime<Utc>,
) -> Result<u64> {
    let json = document
        .to_json()
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    let record = match document {
        CalculationDocument::V1(record) => record,
    };

    let result = conn.execute(
        "INSERT INTO calculations
         (tenant_id, contract_id, period_start, period_end, schema_version,
          document, gross_royalty, net_payable, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            record.tenant_id as i64,
            record.contract_id as i64,
            record.period.start.to_string(),
            record.period.end.to_string(),
            document.schema_version(),
            json,
            record.gross_royalty.to_string(),
            record.recoupment.net_payable.to_string(),
            created_at.timestamp(),
        ],
    );
    match result {
        Ok(_) => Ok(conn.last_insert_rowid() as u64),
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DbError::Constraint(msg.unwrap_or_else(|| {
                format!(
                    "calculation for contract {} period {}",
                    record.contract_id, record.period
                )
            })))
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether a record already exists for this (contract, period).
pub fn exists(conn: &Connection, contract_id: ContractId, period: &RoyaltyPeriod) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM calculations
             WHERE contract_id = ?1 AND period_start = ?2 AND period_end = ?3)",
        rusqlite::params![
            contract_id as i64,
            period.start.to_string(),
            period.end.to_string(),
        ],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// All records for a contract, oldest first, scoped to its tenant.
pub fn list_for_contract(
    conn: &Connection,
    tenant_id: TenantId,
    contract_id: ContractId,
) -> Result<Vec<StoredCalculation>> {
    let mut stmt = conn.prepare(
        "SELECT calculation_id, document FROM calculations
         WHERE tenant_id = ?1 AND contract_id = ?2
         ORDER BY period_start, calculation_id",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![tenant_id as i64, contract_id as i64],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, json)| {
            let document = CalculationDocument::from_json(&json)
                .map_err(|e| DbError::Serialization(format!("calculation {id}: {e}")))?;
            Ok(StoredCalculation {
                id: id as u64,
                record: document.into_record(),
            })
        })
        .collect()
}
