//! Buy/Sell/Hold suggestions from current holdings and the latest ranks

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::holding::{normalize_ticker, Portfolio};
use crate::plan::RankedQuote;

/// Holdings ranked strictly better than this are kept
pub const HOLD_RANK_THRESHOLD: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub ticker: String,
    pub action: Action,
    pub final_rank: Option<i64>,
}

/// Classify every held ticker, then every top-ranked ticker not yet held.
///
/// Held tickers with `final_rank < threshold` are HOLD, the rest SELL
/// (an unknown rank counts as out of range). Entries of `top` not in the
/// portfolio become BUY, in the order given.
pub fn suggest(
    portfolio: &Portfolio,
    ranks: &HashMap<String, Option<i64>>,
    top: &[RankedQuote],
    threshold: i64,
) -> Vec<Suggestion> {
    let mut out: Vec<Suggestion> = portfolio
        .holdings()
        .iter()
        .map(|h| {
            let final_rank = ranks.get(&h.ticker).copied().flatten();
            let action = match final_rank {
                Some(rank) if rank < threshold => Action::Hold,
                _ => Action::Sell,
            };
            Suggestion {
                ticker: h.ticker.clone(),
                action,
                final_rank,
            }
        })
        .collect();

    for quote in top {
        let Some(ticker) = normalize_ticker(&quote.ticker) else {
            continue;
        };
        if portfolio.contains(&ticker) || out.iter().any(|s| s.ticker == ticker) {
            continue;
        }
        out.push(Suggestion {
            ticker,
            action: Action::Buy,
            final_rank: quote.final_rank,
        });
    }

    out
}
