//! Holdings and the portfolio aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One position: how many shares of `ticker` at what average cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// Weighted-average cost per share
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl Holding {
    /// `quantity * price`, saturating at `Decimal::MAX`
    pub fn value(&self) -> Decimal {
        self.quantity.saturating_mul(self.price)
    }
}

/// Holdings unique by ticker. Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Portfolio {
    holdings: Vec<Holding>,
}

/// Uppercase and trim; `None` when nothing is left
pub fn normalize_ticker(ticker: &str) -> Option<String> {
    let t = ticker.trim().to_uppercase();
    (!t.is_empty()).then_some(t)
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw holdings, folding each through [`Portfolio::merge_holding`]
    /// so duplicates merge and invalid entries drop out.
    pub fn from_holdings(holdings: impl IntoIterator<Item = Holding>) -> Self {
        let mut portfolio = Self::new();
        for h in holdings {
            portfolio.merge_holding(&h.ticker, h.quantity, h.price);
        }
        portfolio
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<&Holding> {
        let ticker = normalize_ticker(ticker)?;
        self.holdings.iter().find(|h| h.ticker == ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.get(ticker).is_some()
    }

    /// Record a purchase. An existing ticker keeps one row with the summed
    /// quantity and the weighted-average price
    /// `(q0*p0 + q1*p1) / (q0 + q1)`; a new ticker is appended.
    ///
    /// Non-positive quantity or price, a blank ticker, or a position whose
    /// value does not fit in a `Decimal` leaves the portfolio untouched and
    /// returns `false`.
    pub fn merge_holding(&mut self, ticker: &str, quantity: Decimal, price: Decimal) -> bool {
        let Some(ticker) = normalize_ticker(ticker) else {
            return false;
        };
        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return false;
        }
        let Some(cost) = quantity.checked_mul(price) else {
            return false;
        };

        match self.holdings.iter_mut().find(|h| h.ticker == ticker) {
            Some(existing) => {
                let merged = existing
                    .quantity
                    .checked_mul(existing.price)
                    .and_then(|v| v.checked_add(cost))
                    .zip(existing.quantity.checked_add(quantity))
                    .and_then(|(value, total_qty)| {
                        value.checked_div(total_qty).map(|avg| (total_qty, avg))
                    });
                let Some((total_qty, avg)) = merged else {
                    return false;
                };
                existing.quantity = total_qty;
                existing.price = avg;
            }
            None => self.holdings.push(Holding {
                ticker,
                quantity,
                price,
            }),
        }
        true
    }

    /// Drop `ticker`; returns whether anything was removed
    pub fn remove_holding(&mut self, ticker: &str) -> bool {
        let Some(ticker) = normalize_ticker(ticker) else {
            return false;
        };
        let before = self.holdings.len();
        self.holdings.retain(|h| h.ticker != ticker);
        self.holdings.len() != before
    }

    /// Sum of holding values, saturating at `Decimal::MAX`
    pub fn total_value(&self) -> Decimal {
        self.holdings
            .iter()
            .fold(Decimal::ZERO, |acc, h| acc.saturating_add(h.value()))
    }

    /// Share of total value per ticker, in percent (0-100).
    /// Every holding reports 0 when the total is 0.
    pub fn percentages(&self) -> BTreeMap<String, Decimal> {
        let total = self.total_value();
        self.holdings
            .iter()
            .map(|h| {
                let pct = h
                    .value()
                    .checked_div(total)
                    .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
                    .unwrap_or(Decimal::ZERO);
                (h.ticker.clone(), pct)
            })
            .collect()
    }
}
