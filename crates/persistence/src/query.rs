//! Query building: typed request parameters to parameterized SQL fragments
//!
//! Identifiers cannot be bound, so every column that reaches SQL text comes
//! from a whitelist or from the introspected column set. Literal values are
//! always bound through `?n` placeholders. An identifier outside the
//! whitelist is replaced by the endpoint default, never reported as an error.

use sqlx::query::QueryAs;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use std::collections::{HashMap, HashSet};

use crate::columns::first_present;

pub const DEFAULT_PAGE_SIZE: i64 = 30;
pub const MAX_PAGE_SIZE: i64 = 200;
/// Upper bound on tickers accepted by a single lookup
pub const MAX_TICKERS: usize = 500;

pub const NAME_COLUMNS: &[&str] = &["company_name", "nome_empresa"];
pub const SECTOR_COLUMNS: &[&str] = &["sector", "setor"];
pub const MARKET_CAP_COLUMNS: &[&str] = &["market_cap", "marketcap"];

/// Numeric columns commonly found on the snapshot table, in sort-menu order
const COMMON_NUMERIC_COLUMNS: &[&str] = &[
    "earning_yield",
    "roic_pct",
    "i10_score",
    "liquidity",
    "market_cap",
    "marketcap",
];

// ---------------------------------------------------------------------------
// Typed request parameters
// ---------------------------------------------------------------------------

/// A literal bound to a `?n` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Real(f64),
}

/// Row filters shared by the list endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    /// Case-insensitive substring of ticker or company name
    pub q: Option<String>,
    pub sector: Option<String>,
    pub min_liquidity: Option<f64>,
    pub min_market_cap: Option<f64>,
    /// Restrict to these tickers (already normalized)
    pub tickers: Vec<String>,
}

/// Requested sort: column name plus direction, not yet checked against a whitelist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

impl SortSpec {
    /// `-col` sorts descending, `col` ascending. Blank input means no sort.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
        Some(match raw.strip_prefix('-') {
            Some(column) => Self {
                column: column.to_string(),
                descending: true,
            },
            None => Self {
                column: raw.to_string(),
                descending: false,
            },
        })
    }
}

/// Resolved pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

impl Paging {
    /// `page >= 1`, `page_size` in `[1, 200]`; unparsable input falls back to
    /// page 1 and `default_page_size`.
    pub fn from_params(page: Option<&str>, page_size: Option<&str>, default_page_size: i64) -> Self {
        let default_page_size = clamp_page_size(default_page_size);
        let page = page
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        let page_size = page_size
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(clamp_page_size)
            .unwrap_or(default_page_size);
        let offset = (page - 1).saturating_mul(page_size);

        Self {
            page,
            page_size,
            offset,
        }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::from_params(None, None, DEFAULT_PAGE_SIZE)
    }
}

pub fn clamp_page_size(page_size: i64) -> i64 {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

/// Everything a list endpoint needs, parsed once from the query string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub filter: QueryFilter,
    pub sort: Option<SortSpec>,
    pub paging: Paging,
}

impl ListParams {
    pub fn from_query(params: &HashMap<String, String>, default_page_size: i64) -> Self {
        let text = |key: &str| {
            params
                .get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let number = |key: &str| {
            params
                .get(key)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        let filter = QueryFilter {
            q: text("q"),
            sector: text("sector"),
            min_liquidity: number("min_liquidity"),
            min_market_cap: number("min_mcap"),
            tickers: params
                .get("tickers")
                .map(|s| normalize_tickers(s))
                .unwrap_or_default(),
        };

        Self {
            filter,
            sort: SortSpec::parse(params.get("sort").map(String::as_str)),
            paging: Paging::from_params(
                params.get("page").map(String::as_str),
                params.get("pageSize").map(String::as_str),
                default_page_size,
            ),
        }
    }
}

/// Split on whitespace, commas and semicolons; uppercase; drop duplicates
/// keeping first occurrence; keep at most [`MAX_TICKERS`].
pub fn normalize_tickers(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_TICKERS)
        .collect()
}

// ---------------------------------------------------------------------------
// SQL fragments
// ---------------------------------------------------------------------------

/// `WHERE ...` text plus the values for its placeholders, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub values: Vec<BindValue>,
}

impl WhereClause {
    /// `LIMIT ?n OFFSET ?n+1` numbered after this clause's own placeholders
    pub fn limit_offset(&self) -> String {
        let n = self.values.len();
        format!("LIMIT ?{} OFFSET ?{}", n + 1, n + 2)
    }
}

/// A sortable column: the name clients send and the column it reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    pub name: String,
    pub physical: String,
}

impl SortColumn {
    pub fn new(name: &str) -> Self {
        Self::mapped(name, name)
    }

    pub fn mapped(name: &str, physical: &str) -> Self {
        Self {
            name: name.to_string(),
            physical: physical.to_string(),
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `alias."column"`, or just `"column"` without an alias
pub fn qualify(alias: &str, column: &str) -> String {
    if alias.is_empty() {
        quote_ident(column)
    } else {
        format!("{alias}.{}", quote_ident(column))
    }
}

/// `"schema"."table"`
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Build the WHERE clause for `filter`, emitting a predicate only when its
/// backing column exists in `cols`.
pub fn build_filters(filter: &QueryFilter, cols: &HashSet<String>, alias: &str) -> WhereClause {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<BindValue> = Vec::new();
    let has_ticker = cols.contains("ticker");

    if let Some(q) = &filter.q {
        let pattern = format!("%{q}%");
        match (has_ticker, first_present(cols, NAME_COLUMNS)) {
            (true, Some(name_col)) => {
                values.push(BindValue::Text(pattern.clone()));
                values.push(BindValue::Text(pattern));
                clauses.push(format!(
                    "({} LIKE ?{} OR {} LIKE ?{})",
                    qualify(alias, "ticker"),
                    values.len() - 1,
                    qualify(alias, name_col),
                    values.len()
                ));
            }
            (true, None) => {
                values.push(BindValue::Text(pattern));
                clauses.push(format!("{} LIKE ?{}", qualify(alias, "ticker"), values.len()));
            }
            _ => {}
        }
    }

    if let (Some(sector), Some(sector_col)) = (&filter.sector, first_present(cols, SECTOR_COLUMNS)) {
        values.push(BindValue::Text(sector.clone()));
        clauses.push(format!("{} = ?{}", qualify(alias, sector_col), values.len()));
    }

    if let Some(min) = filter.min_liquidity.filter(|_| cols.contains("liquidity")) {
        values.push(BindValue::Real(min));
        clauses.push(format!("{} >= ?{}", qualify(alias, "liquidity"), values.len()));
    }

    if let (Some(min), Some(mcap_col)) = (filter.min_market_cap, first_present(cols, MARKET_CAP_COLUMNS)) {
        values.push(BindValue::Real(min));
        clauses.push(format!("{} >= ?{}", qualify(alias, mcap_col), values.len()));
    }

    if has_ticker && !filter.tickers.is_empty() {
        let mut placeholders = Vec::with_capacity(filter.tickers.len());
        for ticker in &filter.tickers {
            values.push(BindValue::Text(ticker.clone()));
            placeholders.push(format!("?{}", values.len()));
        }
        clauses.push(format!(
            "{} IN ({})",
            qualify(alias, "ticker"),
            placeholders.join(", ")
        ));
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    WhereClause { sql, values }
}

/// `ORDER BY` for `sort` resolved against `allowed`. Unknown or missing
/// columns fall back to `default` ascending.
pub fn build_order_by(
    sort: Option<&SortSpec>,
    allowed: &[SortColumn],
    alias: &str,
    default: &str,
) -> String {
    let resolved = sort.and_then(|s| {
        allowed
            .iter()
            .find(|c| c.name == s.column)
            .map(|c| (c.physical.as_str(), s.descending))
    });

    match resolved {
        Some((physical, true)) => format!("ORDER BY {} DESC", qualify(alias, physical)),
        Some((physical, false)) => format!("ORDER BY {} ASC", qualify(alias, physical)),
        None => format!("ORDER BY {} ASC", qualify(alias, default)),
    }
}

/// `ticker` plus the common numeric columns present in `cols`
pub fn allowed_sort_columns(cols: &HashSet<String>) -> Vec<SortColumn> {
    std::iter::once("ticker")
        .chain(COMMON_NUMERIC_COLUMNS.iter().copied())
        .filter(|c| cols.contains(*c))
        .map(SortColumn::new)
        .collect()
}

/// Bind `values` in order onto a prepared query
pub fn bind_values<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    values: &[BindValue],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            BindValue::Text(s) => query.bind(s.clone()),
            BindValue::Real(v) => query.bind(*v),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_paging_defaults() {
        let p = Paging::from_params(None, None, 30);
        assert_eq!(p, Paging { page: 1, page_size: 30, offset: 0 });
    }

    #[test]
    fn test_paging_clamps_page_size() {
        assert_eq!(Paging::from_params(None, Some("500"), 30).page_size, 200);
        assert_eq!(Paging::from_params(None, Some("0"), 30).page_size, 1);
        assert_eq!(Paging::from_params(None, Some("-7"), 30).page_size, 1);
        assert_eq!(Paging::from_params(None, Some("200"), 30).page_size, 200);
    }

    #[test]
    fn test_paging_malformed_input_uses_defaults() {
        let p = Paging::from_params(Some("abc"), Some("NaN"), 25);
        assert_eq!(p, Paging { page: 1, page_size: 25, offset: 0 });
        // Configured default is clamped too
        assert_eq!(Paging::from_params(None, None, 1000).page_size, 200);
    }

    #[test]
    fn test_paging_offset() {
        let p = Paging::from_params(Some("3"), Some("20"), 30);
        assert_eq!(p.offset, 40);
        assert_eq!(Paging::from_params(Some("-2"), None, 30).page, 1);
    }

    #[test]
    fn test_sort_spec_parse() {
        assert_eq!(
            SortSpec::parse(Some("-earning_yield")),
            Some(SortSpec { column: "earning_yield".into(), descending: true })
        );
        assert_eq!(
            SortSpec::parse(Some("roic_pct")),
            Some(SortSpec { column: "roic_pct".into(), descending: false })
        );
        assert_eq!(SortSpec::parse(Some("  ")), None);
        assert_eq!(SortSpec::parse(None), None);
    }

    #[test]
    fn test_order_by_whitelisted() {
        let allowed = vec![SortColumn::new("ticker"), SortColumn::new("roic_pct")];
        let sort = SortSpec::parse(Some("-roic_pct"));
        assert_eq!(
            build_order_by(sort.as_ref(), &allowed, "l", "ticker"),
            "ORDER BY l.\"roic_pct\" DESC"
        );
    }

    #[test]
    fn test_order_by_unknown_column_matches_no_sort() {
        let allowed = vec![SortColumn::new("ticker"), SortColumn::new("roic_pct")];
        let bogus = SortSpec::parse(Some("-1; DROP TABLE x"));
        let fallback = build_order_by(bogus.as_ref(), &allowed, "r", "final_rank");
        assert_eq!(fallback, "ORDER BY r.\"final_rank\" ASC");
        assert_eq!(fallback, build_order_by(None, &allowed, "r", "final_rank"));
    }

    #[test]
    fn test_order_by_mapped_column() {
        let allowed = vec![SortColumn::mapped("MF_rank", "mf_rank")];
        let sort = SortSpec::parse(Some("MF_rank"));
        assert_eq!(
            build_order_by(sort.as_ref(), &allowed, "", "final_rank"),
            "ORDER BY \"mf_rank\" ASC"
        );
    }

    #[test]
    fn test_filters_empty_when_nothing_applies() {
        let clause = build_filters(&QueryFilter::default(), &cols(&["ticker"]), "l");
        assert_eq!(clause, WhereClause::default());
        assert_eq!(clause.limit_offset(), "LIMIT ?1 OFFSET ?2");
    }

    #[test]
    fn test_filters_q_matches_ticker_and_name() {
        let filter = QueryFilter {
            q: Some("itau".into()),
            ..Default::default()
        };
        let clause = build_filters(&filter, &cols(&["ticker", "nome_empresa"]), "l");
        assert_eq!(
            clause.sql,
            "WHERE (l.\"ticker\" LIKE ?1 OR l.\"nome_empresa\" LIKE ?2)"
        );
        assert_eq!(
            clause.values,
            vec![BindValue::Text("%itau%".into()), BindValue::Text("%itau%".into())]
        );
    }

    #[test]
    fn test_filters_q_ticker_only() {
        let filter = QueryFilter {
            q: Some("PETR".into()),
            ..Default::default()
        };
        let clause = build_filters(&filter, &cols(&["ticker"]), "");
        assert_eq!(clause.sql, "WHERE \"ticker\" LIKE ?1");
    }

    #[test]
    fn test_filters_use_synonyms_and_number_placeholders() {
        let filter = QueryFilter {
            q: Some("a".into()),
            sector: Some("Bancos".into()),
            min_liquidity: Some(1000.0),
            min_market_cap: Some(5e9),
            tickers: vec![],
        };
        let clause = build_filters(
            &filter,
            &cols(&["ticker", "setor", "liquidity", "marketcap"]),
            "l",
        );
        assert_eq!(
            clause.sql,
            "WHERE l.\"ticker\" LIKE ?1 AND l.\"setor\" = ?2 AND l.\"liquidity\" >= ?3 AND l.\"marketcap\" >= ?4"
        );
        assert_eq!(clause.values.len(), 4);
        assert_eq!(clause.limit_offset(), "LIMIT ?5 OFFSET ?6");
    }

    #[test]
    fn test_filters_skip_absent_columns() {
        let filter = QueryFilter {
            sector: Some("Bancos".into()),
            min_liquidity: Some(1.0),
            min_market_cap: Some(1.0),
            ..Default::default()
        };
        let clause = build_filters(&filter, &cols(&["ticker", "company_name"]), "l");
        assert!(clause.sql.is_empty());
        assert!(clause.values.is_empty());
    }

    #[test]
    fn test_filters_ticker_list() {
        let filter = QueryFilter {
            sector: Some("Bancos".into()),
            tickers: vec!["ITSA4".into(), "BBAS3".into()],
            ..Default::default()
        };
        let clause = build_filters(&filter, &cols(&["ticker", "sector"]), "l");
        assert_eq!(
            clause.sql,
            "WHERE l.\"sector\" = ?1 AND l.\"ticker\" IN (?2, ?3)"
        );
    }

    #[test]
    fn test_normalize_tickers() {
        assert_eq!(normalize_tickers("petr4, ITSA4, petr4"), vec!["PETR4", "ITSA4"]);
        assert_eq!(normalize_tickers("a;b\nc\t d,,"), vec!["A", "B", "C", "D"]);
        assert!(normalize_tickers(" ,; ").is_empty());
    }

    #[test]
    fn test_normalize_tickers_caps_at_limit() {
        let raw: Vec<String> = (0..600).map(|i| format!("T{i}")).collect();
        let tickers = normalize_tickers(&raw.join(","));
        assert_eq!(tickers.len(), MAX_TICKERS);
        assert_eq!(tickers[0], "T0");
    }

    #[test]
    fn test_list_params_from_query() {
        let params = ListParams::from_query(
            &query(&[
                ("q", "  itsa "),
                ("sector", ""),
                ("min_liquidity", "abc"),
                ("min_mcap", "1000000"),
                ("sort", "-roic_pct"),
                ("page", "2"),
                ("pageSize", "10"),
            ]),
            30,
        );
        assert_eq!(params.filter.q.as_deref(), Some("itsa"));
        assert_eq!(params.filter.sector, None);
        assert_eq!(params.filter.min_liquidity, None);
        assert_eq!(params.filter.min_market_cap, Some(1_000_000.0));
        assert_eq!(params.sort.map(|s| s.descending), Some(true));
        assert_eq!(params.paging.offset, 10);
    }

    #[test]
    fn test_allowed_sort_columns() {
        let allowed = allowed_sort_columns(&cols(&["ticker", "roic_pct", "marketcap", "price"]));
        let names: Vec<&str> = allowed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ticker", "roic_pct", "marketcap"]);
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified_table("main", "t"), "\"main\".\"t\"");
    }
}
