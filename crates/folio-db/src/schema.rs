//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Contracts
-- ============================================================

CREATE TABLE IF NOT EXISTS contracts (
    contract_id INTEGER PRIMARY KEY,
    tenant_id INTEGER NOT NULL,
    title_id INTEGER NOT NULL,
    tier_mode TEXT NOT NULL CHECK (tier_mode IN ('period', 'lifetime')),
    advance_total TEXT NOT NULL DEFAULT '0',
    advance_recouped TEXT NOT NULL DEFAULT '0',
    advance_version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_contracts_tenant ON contracts(tenant_id);

CREATE TABLE IF NOT EXISTS contract_tiers (
    tier_id INTEGER PRIMARY KEY,
    contract_id INTEGER NOT NULL REFERENCES contracts(contract_id) ON DELETE CASCADE,
    format TEXT NOT NULL CHECK (format IN ('physical', 'ebook', 'audiobook')),
    min_quantity TEXT NOT NULL,
    max_quantity TEXT,
    rate TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tiers_contract ON contract_tiers(contract_id, format);

CREATE TABLE IF NOT EXISTS contract_splits (
    contract_id INTEGER NOT NULL REFERENCES contracts(contract_id) ON DELETE CASCADE,
    owner_id INTEGER NOT NULL,
    share_pct TEXT NOT NULL,
    PRIMARY KEY (contract_id, owner_id)
);

-- ============================================================
-- Sales (netted per row: negative quantity = return)
-- ============================================================

CREATE TABLE IF NOT EXISTS sales (
    sale_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    title_id INTEGER NOT NULL,
    format TEXT NOT NULL,
    sale_date TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    revenue TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sales_lookup ON sales(tenant_id, title_id, format, sale_date);

CREATE TABLE IF NOT EXISTS sales_coverage (
    tenant_id INTEGER NOT NULL,
    title_id INTEGER NOT NULL,
    format TEXT NOT NULL,
    loaded_through TEXT NOT NULL,
    PRIMARY KEY (tenant_id, title_id, format)
);

-- ============================================================
-- Calculation records (append-only)
-- ============================================================

CREATE TABLE IF NOT EXISTS calculations (
    calculation_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    contract_id INTEGER NOT NULL REFERENCES contracts(contract_id),
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    document TEXT NOT NULL,
    gross_royalty TEXT NOT NULL,
    net_payable TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (contract_id, period_start, period_end)
);

CREATE INDEX IF NOT EXISTS idx_calculations_tenant ON calculations(tenant_id, contract_id);

CREATE TRIGGER IF NOT EXISTS calculations_no_update
BEFORE UPDATE ON calculations
BEGIN
    SELECT RAISE(ABORT, 'calculation records are append-only');
END;

CREATE TRIGGER IF NOT EXISTS calculations_no_delete
BEFORE DELETE ON calculations
BEGIN
    SELECT RAISE(ABORT, 'calculation records are append-only');
END;
"#;
