//! Ticker repository: single-ticker detail, checklist membership and notes,
//! connection diagnostics

use crate::columns::ColumnCache;
use crate::query::{qualified_table, qualify};
use crate::repository::projection::{notes_column, snapshot_columns};
use crate::repository::ranking::SnapshotStock;
use crate::schema::{RANKING_TABLE, SNAPSHOT_TABLE};
use crate::DbResult;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, FromRow, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

/// Rows returned by the connection diagnostic
pub const SAMPLE_ROWS: i64 = 5;

/// Snapshot row plus the user's checklist state for that ticker
#[derive(Debug, Clone, Serialize)]
pub struct TickerDetail {
    #[serde(flatten)]
    pub stock: SnapshotStock,
    pub notes: Option<String>,
    pub in_checklist: bool,
}

/// Repository for per-ticker reads and checklist writes
pub struct TickerRepository<'a> {
    pool: &'a SqlitePool,
    columns: &'a ColumnCache,
    schema: &'a str,
}

impl<'a> TickerRepository<'a> {
    pub fn new(pool: &'a SqlitePool, columns: &'a ColumnCache, schema: &'a str) -> Self {
        Self {
            pool,
            columns,
            schema,
        }
    }

    /// Snapshot row for `ticker` joined with its checklist row, if any
    pub async fn get_ticker(&self, ticker: &str) -> DbResult<Option<TickerDetail>> {
        let snap_cols = self.columns.get_columns(self.pool, SNAPSHOT_TABLE, self.schema).await?;
        let rank_cols = self.columns.get_columns(self.pool, RANKING_TABLE, self.schema).await?;

        let mut select = snapshot_columns(&snap_cols, "l");
        select.push(notes_column(&rank_cols, "c"));
        select.push(format!("({} IS NOT NULL) AS \"in_checklist\"", qualify("c", "ticker")));

        let sql = format!(
            "SELECT {} FROM {} l LEFT JOIN {} c ON {} = {} WHERE {} = ?1 LIMIT 1",
            select.join(", "),
            qualified_table(self.schema, SNAPSHOT_TABLE),
            qualified_table(self.schema, RANKING_TABLE),
            qualify("c", "ticker"),
            qualify("l", "ticker"),
            qualify("l", "ticker"),
        );

        let row = sqlx::query(&sql).bind(ticker).fetch_optional(self.pool).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TickerDetail {
            stock: SnapshotStock::from_row(&row)?,
            notes: row.try_get("notes")?,
            in_checklist: row.try_get::<i64, _>("in_checklist")? != 0,
        }))
    }

    /// Apply a checklist change for `ticker`.
    ///
    /// `in_checklist == Some(true)` or a `notes` value upserts the ranking row
    /// (existing notes survive unless new ones are given);
    /// `in_checklist == Some(false)` deletes it. The two statements are not
    /// wrapped in a transaction.
    pub async fn update_checklist(
        &self,
        ticker: &str,
        in_checklist: Option<bool>,
        notes: Option<&str>,
    ) -> DbResult<()> {
        let table = qualified_table(self.schema, RANKING_TABLE);

        if in_checklist == Some(true) || notes.is_some() {
            let sql = format!(
                r#"INSERT INTO {table} ("ticker", "notes")
                   VALUES (?1, COALESCE(?2, ''))
                   ON CONFLICT("ticker") DO UPDATE SET "notes" = COALESCE(?2, "notes")"#
            );
            sqlx::query(&sql)
                .bind(ticker)
                .bind(notes)
                .execute(self.pool)
                .await?;
            info!(ticker, notes_updated = notes.is_some(), "Checklist entry saved");
        }

        if in_checklist == Some(false) {
            let sql = format!(r#"DELETE FROM {table} WHERE "ticker" = ?1"#);
            let result = sqlx::query(&sql).bind(ticker).execute(self.pool).await?;
            info!(ticker, removed = result.rows_affected(), "Checklist entry removed");
        }

        Ok(())
    }

    /// First raw snapshot rows, every column rendered by its storage class
    pub async fn sample_rows(&self, limit: i64) -> DbResult<Vec<serde_json::Value>> {
        let sql = format!("SELECT * FROM {} LIMIT ?1", qualified_table(self.schema, SNAPSHOT_TABLE));
        let rows = sqlx::query(&sql).bind(limit).fetch_all(self.pool).await?;
        debug!(rows = rows.len(), "sampled snapshot rows");
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Round-trip a trivial statement
    pub async fn ping(&self) -> DbResult<()> {
        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(self.pool).await?;
        debug!(one, "ping");
        Ok(())
    }

    /// Any one ticker from the snapshot table, to prove it is readable
    pub async fn any_snapshot_ticker(&self) -> DbResult<Option<String>> {
        let sql = format!(
            "SELECT \"ticker\" FROM {} LIMIT 1",
            qualified_table(self.schema, SNAPSHOT_TABLE)
        );
        let row: Option<(String,)> = sqlx::query_as(&sql).fetch_optional(self.pool).await?;
        Ok(row.map(|(t,)| t))
    }
}

fn row_to_json(row: &SqliteRow) -> serde_json::Value {
    use serde_json::Value;

    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let kind = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => None,
            Ok(raw) => Some(raw.type_info().name().to_string()),
            Err(_) => None,
        };
        let value = match kind.as_deref() {
            Some("INTEGER") => row.try_get::<i64, _>(idx).map(Value::from).unwrap_or(Value::Null),
            Some("REAL") => row.try_get::<f64, _>(idx).map(Value::from).unwrap_or(Value::Null),
            Some("TEXT") => row.try_get::<String, _>(idx).map(Value::from).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        map.insert(column.name().to_string(), value);
    }
    Value::Object(map)
}
