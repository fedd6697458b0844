//! Ranking repository: the read paths behind the ranking pages

use std::collections::HashMap;
use std::time::Instant;

use crate::columns::{first_present, ColumnCache};
use crate::query::{
    allowed_sort_columns, bind_values, build_filters, build_order_by, normalize_tickers, qualified_table,
    qualify, ListParams, SortColumn,
};
use crate::repository::projection::{ranked_columns, snapshot_columns};
use crate::schema::{RANKING_TABLE, SNAPSHOT_TABLE};
use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Number of top-ranked rows offered as buy candidates
pub const BUY_CANDIDATES: i64 = 10;

/// Price column names seen on the snapshot table, in preference order
const PRICE_COLUMNS: &[&str] = &["price", "preco", "cotacao", "last_price", "current_price"];

/// A ranked ticker joined with its latest snapshot
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RankedStock {
    pub ticker: String,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub earning_yield: Option<f64>,
    pub roic_pct: Option<f64>,
    pub i10_score: Option<f64>,
    #[serde(rename = "MF_rank")]
    pub mf_rank: Option<i64>,
    pub final_rank: Option<i64>,
    pub liquidity: Option<f64>,
    pub market_cap: Option<f64>,
    pub notes: Option<String>,
}

/// A row of the latest market snapshot
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotStock {
    pub ticker: String,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub earning_yield: Option<f64>,
    pub roic_pct: Option<f64>,
    pub i10_score: Option<f64>,
    pub liquidity: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Rank of a requested ticker; `None` when the ticker is not ranked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRank {
    pub ticker: String,
    pub final_rank: Option<i64>,
}

/// A top-ranked ticker with its current price
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BuyCandidate {
    pub ticker: String,
    pub price: Option<f64>,
    pub final_rank: Option<i64>,
}

/// One page of rows plus the size of the whole filtered set
#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    pub rows: Vec<T>,
    pub total: i64,
}

/// Sort whitelist of the checklist listing
fn checklist_sort_columns() -> Vec<SortColumn> {
    vec![
        SortColumn::new("ticker"),
        SortColumn::new("earning_yield"),
        SortColumn::new("roic_pct"),
        SortColumn::new("i10_score"),
        SortColumn::mapped("MF_rank", "mf_rank"),
        SortColumn::new("final_rank"),
        SortColumn::new("liquidity"),
        SortColumn::new("market_cap"),
    ]
}

/// Repository for the ranking and snapshot tables
pub struct RankingRepository<'a> {
    pool: &'a SqlitePool,
    columns: &'a ColumnCache,
    schema: &'a str,
}

impl<'a> RankingRepository<'a> {
    pub fn new(pool: &'a SqlitePool, columns: &'a ColumnCache, schema: &'a str) -> Self {
        Self {
            pool,
            columns,
            schema,
        }
    }

    /// Ranked checklist: ranking LEFT JOIN snapshot, filtered on the snapshot
    /// columns, sorted on the ranking columns (default `final_rank`).
    pub async fn list_checklist(&self, params: &ListParams) -> DbResult<PageResult<RankedStock>> {
        let rank_cols = self.columns.get_columns(self.pool, RANKING_TABLE, self.schema).await?;
        let snap_cols = self.columns.get_columns(self.pool, SNAPSHOT_TABLE, self.schema).await?;

        let clause = build_filters(&params.filter, &snap_cols, "l");
        let allowed: Vec<SortColumn> = checklist_sort_columns()
            .into_iter()
            .filter(|c| rank_cols.contains(&c.physical))
            .collect();
        let order_by = build_order_by(params.sort.as_ref(), &allowed, "r", "final_rank");

        let from = format!(
            "FROM {} r LEFT JOIN {} l ON {} = {}",
            qualified_table(self.schema, RANKING_TABLE),
            qualified_table(self.schema, SNAPSHOT_TABLE),
            qualify("l", "ticker"),
            qualify("r", "ticker"),
        );
        let data_sql = format!(
            "SELECT {} {from} {} {order_by} {}",
            ranked_columns(&rank_cols, "r", &snap_cols, "l").join(", "),
            clause.sql,
            clause.limit_offset(),
        );
        let count_sql = format!("SELECT COUNT(*) {from} {}", clause.sql);

        let started = Instant::now();
        let data = bind_values(sqlx::query_as::<_, RankedStock>(&data_sql), &clause.values)
            .bind(params.paging.page_size)
            .bind(params.paging.offset)
            .fetch_all(self.pool);
        let count = bind_values(sqlx::query_as::<_, (i64,)>(&count_sql), &clause.values).fetch_one(self.pool);
        let (rows, (total,)) = tokio::try_join!(data, count)?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            binds = clause.values.len(),
            sql = %data_sql,
            "checklist query"
        );
        Ok(PageResult { rows, total })
    }

    /// Snapshot listing with the projection driven by the columns present
    /// (default sort `ticker`).
    pub async fn list_stocks(&self, params: &ListParams) -> DbResult<PageResult<SnapshotStock>> {
        let cols = self.columns.get_columns(self.pool, SNAPSHOT_TABLE, self.schema).await?;

        let clause = build_filters(&params.filter, &cols, "l");
        let order_by = build_order_by(params.sort.as_ref(), &allowed_sort_columns(&cols), "l", "ticker");

        let from = format!("FROM {} l", qualified_table(self.schema, SNAPSHOT_TABLE));
        let data_sql = format!(
            "SELECT {} {from} {} {order_by} {}",
            snapshot_columns(&cols, "l").join(", "),
            clause.sql,
            clause.limit_offset(),
        );
        let count_sql = format!("SELECT COUNT(*) {from} {}", clause.sql);

        let started = Instant::now();
        let data = bind_values(sqlx::query_as::<_, SnapshotStock>(&data_sql), &clause.values)
            .bind(params.paging.page_size)
            .bind(params.paging.offset)
            .fetch_all(self.pool);
        let count = bind_values(sqlx::query_as::<_, (i64,)>(&count_sql), &clause.values).fetch_one(self.pool);
        let (rows, (total,)) = tokio::try_join!(data, count)?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            binds = clause.values.len(),
            sql = %data_sql,
            "stocks query"
        );
        Ok(PageResult { rows, total })
    }

    /// Ranks for a delimited ticker list. Every normalized ticker gets an
    /// entry, in input order, with `final_rank: None` when it is not ranked.
    pub async fn get_ranks_by_tickers(&self, raw: &str) -> DbResult<Vec<TickerRank>> {
        let tickers = normalize_tickers(raw);
        if tickers.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=tickers.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT \"ticker\", CAST(\"final_rank\" AS INTEGER) FROM {} WHERE \"ticker\" IN ({})",
            qualified_table(self.schema, RANKING_TABLE),
            placeholders.join(", ")
        );

        let mut query = sqlx::query_as::<_, (String, Option<i64>)>(&sql);
        for ticker in &tickers {
            query = query.bind(ticker);
        }
        let found: HashMap<String, Option<i64>> = query
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(|(ticker, rank)| (ticker.to_uppercase(), rank))
            .collect();
        debug!(requested = tickers.len(), found = found.len(), "rank lookup");

        Ok(tickers
            .into_iter()
            .map(|ticker| {
                let final_rank = found.get(&ticker).copied().flatten();
                TickerRank { ticker, final_rank }
            })
            .collect())
    }

    /// Best `limit` ranked tickers that have a snapshot, with their price
    pub async fn top_buy_candidates(&self, limit: i64) -> DbResult<Vec<BuyCandidate>> {
        let cols = self.columns.get_columns(self.pool, SNAPSHOT_TABLE, self.schema).await?;
        let price_col = first_present(&cols, PRICE_COLUMNS).ok_or_else(|| DbError::MissingColumn {
            table: SNAPSHOT_TABLE.to_string(),
            candidates: PRICE_COLUMNS.join(", "),
        })?;

        let sql = format!(
            r#"SELECT r."ticker" AS "ticker",
                      CAST({} AS REAL) AS "price",
                      CAST(r."final_rank" AS INTEGER) AS "final_rank"
                 FROM {} r
                 JOIN {} l ON l."ticker" = r."ticker"
                ORDER BY r."final_rank" ASC
                LIMIT ?1"#,
            qualify("l", price_col),
            qualified_table(self.schema, RANKING_TABLE),
            qualified_table(self.schema, SNAPSHOT_TABLE),
        );

        let rows = sqlx::query_as::<_, BuyCandidate>(&sql)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }
}
