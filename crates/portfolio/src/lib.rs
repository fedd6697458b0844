//! Client-side portfolio tooling for the Magic Formula ranking
//!
//! Provides:
//! - Holdings with weighted-average merge and allocation percentages
//! - Equal-weight buy plan over the top-ranked tickers, cart breakdown
//! - Buy/Sell/Hold suggestions against the current ranks
//! - Local JSON holdings store
//! - HTTP client for the ranking API

pub mod client;
pub mod holding;
pub mod plan;
pub mod store;
pub mod suggest;

pub use client::{ClientError, RankingClient, DEFAULT_API_URL};
pub use holding::{normalize_ticker, Holding, Portfolio};
pub use plan::{
    build_equal_weight_plan, cart_breakdown, BuyPlan, CartItem, CartLine, CartSummary, PlanItem,
    RankedQuote, PLAN_TARGET_COUNT,
};
pub use store::{
    parse_holdings, HoldingStore, JsonFileStore, MemoryStore, StoreError, DEFAULT_STORE_PATH,
};
pub use suggest::{suggest, Action, Suggestion, HOLD_RANK_THRESHOLD};
