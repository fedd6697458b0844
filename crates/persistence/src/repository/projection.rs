//! SELECT lists derived from the introspected column sets
//!
//! This is the only place that decides how an optional column reaches the
//! output: present columns are selected (and cast), absent ones become
//! `NULL AS name` so the row types stay fixed.

use std::collections::HashSet;

use crate::columns::first_present;
use crate::query::{qualify, quote_ident, MARKET_CAP_COLUMNS, NAME_COLUMNS, SECTOR_COLUMNS};

#[derive(Clone, Copy)]
enum Cast {
    Text,
    Real,
    Integer,
}

fn select_one(cols: &HashSet<String>, alias: &str, candidates: &[&str], cast: Cast, name: &str) -> String {
    let out = quote_ident(name);
    match first_present(cols, candidates) {
        Some(col) => {
            let src = qualify(alias, col);
            match cast {
                Cast::Text => format!("{src} AS {out}"),
                Cast::Real => format!("CAST({src} AS REAL) AS {out}"),
                Cast::Integer => format!("CAST({src} AS INTEGER) AS {out}"),
            }
        }
        None => format!("NULL AS {out}"),
    }
}

/// Columns of `SnapshotStock` read from the snapshot table
pub fn snapshot_columns(cols: &HashSet<String>, alias: &str) -> Vec<String> {
    vec![
        format!("{} AS \"ticker\"", qualify(alias, "ticker")),
        select_one(cols, alias, NAME_COLUMNS, Cast::Text, "company_name"),
        select_one(cols, alias, SECTOR_COLUMNS, Cast::Text, "sector"),
        select_one(cols, alias, &["earning_yield"], Cast::Real, "earning_yield"),
        select_one(cols, alias, &["roic_pct"], Cast::Real, "roic_pct"),
        select_one(cols, alias, &["i10_score"], Cast::Real, "i10_score"),
        select_one(cols, alias, &["liquidity"], Cast::Real, "liquidity"),
        select_one(cols, alias, MARKET_CAP_COLUMNS, Cast::Real, "market_cap"),
    ]
}

/// Columns of `RankedStock`: scores from the ranking table (`rank_alias`),
/// name and sector from the snapshot table (`snap_alias`)
pub fn ranked_columns(
    rank_cols: &HashSet<String>,
    rank_alias: &str,
    snap_cols: &HashSet<String>,
    snap_alias: &str,
) -> Vec<String> {
    vec![
        format!("{} AS \"ticker\"", qualify(rank_alias, "ticker")),
        select_one(snap_cols, snap_alias, NAME_COLUMNS, Cast::Text, "company_name"),
        select_one(snap_cols, snap_alias, SECTOR_COLUMNS, Cast::Text, "sector"),
        select_one(rank_cols, rank_alias, &["earning_yield"], Cast::Real, "earning_yield"),
        select_one(rank_cols, rank_alias, &["roic_pct"], Cast::Real, "roic_pct"),
        select_one(rank_cols, rank_alias, &["i10_score"], Cast::Real, "i10_score"),
        select_one(rank_cols, rank_alias, &["mf_rank"], Cast::Integer, "mf_rank"),
        select_one(rank_cols, rank_alias, &["final_rank"], Cast::Integer, "final_rank"),
        select_one(rank_cols, rank_alias, &["liquidity"], Cast::Real, "liquidity"),
        select_one(rank_cols, rank_alias, MARKET_CAP_COLUMNS, Cast::Real, "market_cap"),
        select_one(rank_cols, rank_alias, &["notes"], Cast::Text, "notes"),
    ]
}

/// `notes` of the ranking table, or NULL when the column is missing
pub fn notes_column(rank_cols: &HashSet<String>, rank_alias: &str) -> String {
    select_one(rank_cols, rank_alias, &["notes"], Cast::Text, "notes")
}
