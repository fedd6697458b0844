//! Runtime configuration read from the environment (and `.env`)

use persistence::query::{clamp_page_size, DEFAULT_PAGE_SIZE};
use persistence::schema::DEFAULT_SCHEMA;
use portfolio::{DEFAULT_API_URL, DEFAULT_STORE_PATH};

#[derive(Debug, Clone)]
pub struct Config {
    database_url: Option<String>,
    pub schema: String,
    pub page_size: i64,
    pub portfolio_path: String,
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            database_url: get("DATABASE_URL"),
            schema: get("DB_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            page_size: get("PAGE_SIZE")
                .and_then(|v| v.parse().ok())
                .map(clamp_page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            portfolio_path: get("PORTFOLIO_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
            api_url: get("MAGIC_WEB_API").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        }
    }

    /// Connection string; only the commands that touch the database need it
    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set (e.g. sqlite:data/magic.db)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert!(cfg.database_url().is_err());
        assert_eq!(cfg.schema, "main");
        assert_eq!(cfg.page_size, 30);
        assert_eq!(cfg.portfolio_path, "data/portfolio_items.json");
        assert_eq!(cfg.api_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "sqlite:data/magic.db"),
            ("DB_SCHEMA", "ranking"),
            ("PAGE_SIZE", "500"),
            ("PORTFOLIO_PATH", "/tmp/p.json"),
        ]);
        assert_eq!(cfg.database_url().unwrap(), "sqlite:data/magic.db");
        assert_eq!(cfg.schema, "ranking");
        assert_eq!(cfg.page_size, 200);
        assert_eq!(cfg.portfolio_path, "/tmp/p.json");
    }

    #[test]
    fn test_blank_values_fall_back() {
        let cfg = config(&[("DATABASE_URL", "  "), ("PAGE_SIZE", "abc")]);
        assert!(cfg.database_url().is_err());
        assert_eq!(cfg.page_size, 30);
    }
}
