//! Schema introspection: which optional columns a table actually has
//!
//! The batch job that fills the ranking tables has shipped several column
//! layouts over time (`sector` vs `setor`, `market_cap` vs `marketcap`, ...).
//! Every query that touches an optional column asks the cache first.

use crate::DbResult;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Column names of one table
pub type ColumnSet = Arc<HashSet<String>>;

/// Per `schema.table` cache of catalog lookups, kept for the process lifetime.
///
/// A schema change is only observed after a restart (or an explicit
/// [`ColumnCache::invalidate`]). Two requests missing the cache at the same
/// time both run the catalog query; the last write wins.
#[derive(Debug, Default)]
pub struct ColumnCache {
    entries: RwLock<HashMap<String, ColumnSet>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns of `schema.table`, from cache or from `pragma_table_info`.
    /// A table that does not exist yields an empty set.
    pub async fn get_columns(
        &self,
        pool: &SqlitePool,
        table: &str,
        schema: &str,
    ) -> DbResult<ColumnSet> {
        let key = cache_key(schema, table);
        if let Some(cols) = self.cached(&key) {
            return Ok(cols);
        }

        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?1, ?2)")
            .bind(table)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let cols: ColumnSet = Arc::new(rows.into_iter().map(|(name,)| name).collect());
        debug!(table = %key, columns = cols.len(), "Introspected table columns");

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, cols.clone());
        }
        Ok(cols)
    }

    /// Forget one table so the next lookup hits the catalog again
    pub fn invalidate(&self, schema: &str, table: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&cache_key(schema, table));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn cached(&self, key: &str) -> Option<ColumnSet> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

fn cache_key(schema: &str, table: &str) -> String {
    format!("{schema}.{table}")
}

/// First candidate present in `cols`
pub fn first_present<'a>(cols: &HashSet<String>, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| cols.contains(*c))
}
