//! Database schema definitions
//!
//! Both tables are filled by the external ranking batch job. The statements
//! below only create them when missing so a fresh database is usable; an
//! existing table keeps whatever column set the batch job gave it.

/// Ranking table: final rank, factor scores and checklist notes
pub const RANKING_TABLE: &str = "ranking_magic_checklist";

/// Latest market snapshot per ticker: name, sector, price, fundamentals
pub const SNAPSHOT_TABLE: &str = "statusinvest_latest";

pub const DEFAULT_SCHEMA: &str = "main";

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Magic Formula ranking (one row per ticker, 1 = best)
CREATE TABLE IF NOT EXISTS ranking_magic_checklist (
    ticker TEXT NOT NULL PRIMARY KEY,
    earning_yield REAL,
    roic_pct REAL,
    i10_score REAL,
    mf_rank INTEGER,
    final_rank INTEGER,
    liquidity REAL,
    market_cap REAL,
    notes TEXT
);

-- Latest market snapshot
CREATE TABLE IF NOT EXISTS statusinvest_latest (
    ticker TEXT NOT NULL PRIMARY KEY,
    company_name TEXT,
    sector TEXT,
    price REAL,
    earning_yield REAL,
    roic_pct REAL,
    i10_score REAL,
    liquidity REAL,
    market_cap REAL
);

-- ========== INDEXES ==========

-- Only ticker is guaranteed on tables created by the batch job.
-- The checklist upsert relies on this one.
CREATE UNIQUE INDEX IF NOT EXISTS idx_ranking_ticker ON ranking_magic_checklist(ticker)
"#;

/// Column additions for tables created before the checklist gained notes
pub const MIGRATIONS: &[&str] = &["ALTER TABLE ranking_magic_checklist ADD COLUMN notes TEXT"];
