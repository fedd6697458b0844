//! Local persistence of the holdings list

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::holding::{Holding, Portfolio};

/// Default location of the holdings file, relative to the working directory
pub const DEFAULT_STORE_PATH: &str = "data/portfolio_items.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize holdings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where the portfolio lives between runs.
///
/// `load` never fails: a missing or corrupt store reads as an empty
/// portfolio.
#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn load(&self) -> Portfolio;
    async fn save(&self, portfolio: &Portfolio) -> Result<(), StoreError>;
}

/// Parse a stored holdings document.
///
/// Anything but a JSON array reads as empty. Elements that do not decode as
/// a holding are skipped; the rest are folded through
/// [`Portfolio::from_holdings`].
pub fn parse_holdings(raw: &str) -> Portfolio {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Holdings store is not valid JSON, starting empty");
            return Portfolio::new();
        }
    };

    let serde_json::Value::Array(items) = value else {
        warn!("Holdings store is not an array, starting empty");
        return Portfolio::new();
    };

    let total = items.len();
    let holdings: Vec<Holding> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if holdings.len() != total {
        debug!(skipped = total - holdings.len(), "Dropped malformed holdings");
    }
    Portfolio::from_holdings(holdings)
}

/// Holdings kept as a pretty-printed JSON array on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HoldingStore for JsonFileStore {
    async fn load(&self) -> Portfolio {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => parse_holdings(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Portfolio::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read holdings store");
                Portfolio::new()
            }
        }
    }

    async fn save(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(portfolio)?;
        tokio::fs::write(&self.path, body).await?;
        info!(path = %self.path.display(), holdings = portfolio.len(), "Portfolio saved");
        Ok(())
    }
}

/// Keeps the serialized document in memory
#[derive(Default)]
pub struct MemoryStore {
    raw: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary stored document, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl HoldingStore for MemoryStore {
    async fn load(&self) -> Portfolio {
        self.raw().map(|raw| parse_holdings(&raw)).unwrap_or_default()
    }

    async fn save(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let body = serde_json::to_string(portfolio)?;
        if let Ok(mut guard) = self.raw.lock() {
            *guard = Some(body);
        }
        Ok(())
    }
}
