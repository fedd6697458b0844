//! Buy planning: equal-weight plan over the top-ranked tickers and the
//! cart breakdown against the current portfolio

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::holding::Portfolio;

/// Number of slices the investment is divided into, regardless of how
/// many ranked rows are available
pub const PLAN_TARGET_COUNT: usize = 10;

/// A ranked ticker with its latest price, as served by `/api/buy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedQuote {
    pub ticker: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub final_rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanItem {
    pub ticker: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuyPlan {
    pub items: Vec<PlanItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub leftover: Decimal,
}

impl BuyPlan {
    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(|i| i.cost).sum()
    }
}

/// Whole shares of `price` that `cash` buys; 0 for a missing or
/// non-positive price, or when the count does not fit in a `Decimal`
fn whole_shares(cash: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    cash.checked_div(price)
        .map(|q| q.floor())
        .unwrap_or(Decimal::ZERO)
}

/// Split `amount` into [`PLAN_TARGET_COUNT`] equal slices over the first
/// ranked rows, buying whole shares only.
///
/// Each row gets `floor(slice / price)` shares (0 when the price is missing
/// or not positive). Whatever cash remains is then spent on the **first**
/// row alone, as many whole shares as it affords. No attempt is made to
/// spread the remainder over the other rows.
pub fn build_equal_weight_plan(amount: Decimal, ranked: &[RankedQuote]) -> BuyPlan {
    if amount <= Decimal::ZERO || ranked.is_empty() {
        return BuyPlan::default();
    }

    let per_slice = amount / Decimal::from(PLAN_TARGET_COUNT as u64);
    let mut items: Vec<PlanItem> = ranked
        .iter()
        .take(PLAN_TARGET_COUNT)
        .map(|row| {
            let price = row.price.unwrap_or_default();
            let quantity = whole_shares(per_slice, price);
            PlanItem {
                ticker: row.ticker.clone(),
                price,
                quantity,
                cost: quantity.saturating_mul(price),
            }
        })
        .collect();

    let spent = items
        .iter()
        .fold(Decimal::ZERO, |acc, i| acc.saturating_add(i.cost));
    let mut leftover = amount - spent;

    if let Some(first) = items.first_mut() {
        let extra = whole_shares(leftover, first.price);
        if let Some(quantity) = first.quantity.checked_add(extra) {
            first.quantity = quantity;
            first.cost = quantity.saturating_mul(first.price);
            leftover -= extra * first.price;
        }
    }

    BuyPlan { items, leftover }
}

/// A line the user intends to buy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub ticker: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    pub ticker: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    /// Share of the cart total, percent
    #[serde(with = "rust_decimal::serde::float")]
    pub cart_pct: Decimal,
    /// Share of portfolio + cart after buying, percent, counting the
    /// ticker's existing holding
    #[serde(with = "rust_decimal::serde::float")]
    pub portfolio_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    #[serde(with = "rust_decimal::serde::float")]
    pub cart_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub portfolio_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub combined_total: Decimal,
}

fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    part.checked_div(whole)
        .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

impl CartItem {
    fn cost(&self) -> Decimal {
        self.price.saturating_mul(self.quantity)
    }
}

/// How each cart line weighs in the cart and in the portfolio it would produce
pub fn cart_breakdown(portfolio: &Portfolio, cart: &[CartItem]) -> CartSummary {
    let cart_total = cart
        .iter()
        .fold(Decimal::ZERO, |acc, i| acc.saturating_add(i.cost()));
    let portfolio_total = portfolio.total_value();
    let combined_total = portfolio_total.saturating_add(cart_total);

    let lines = cart
        .iter()
        .map(|item| {
            let cost = item.cost();
            let existing = portfolio.get(&item.ticker).map(|h| h.value()).unwrap_or_default();
            CartLine {
                ticker: item.ticker.clone(),
                cost,
                cart_pct: percent_of(cost, cart_total),
                portfolio_pct: percent_of(existing.saturating_add(cost), combined_total),
            }
        })
        .collect();

    CartSummary {
        lines,
        cart_total,
        portfolio_total,
        combined_total,
    }
}

impl From<&PlanItem> for CartItem {
    fn from(item: &PlanItem) -> Self {
        Self {
            ticker: item.ticker.clone(),
            price: item.price,
            quantity: item.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quotes(prices: &[Option<Decimal>]) -> Vec<RankedQuote> {
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| RankedQuote {
                ticker: format!("T{}", i + 1),
                price: *price,
                final_rank: Some(i as i64 + 1),
            })
            .collect()
    }

    #[test]
    fn test_plan_ten_tickers() {
        let prices: Vec<Option<Decimal>> = (1..=10).map(|i| Some(Decimal::from(i * 10))).collect();
        let plan = build_equal_weight_plan(dec!(1000), &quotes(&prices));

        let qty: Vec<Decimal> = plan.items.iter().map(|i| i.quantity).collect();
        // Slices of 100 buy 10,5,3,2,2,1,1,1,1,1 (cost 870); the 130 left buys 13 more of T1
        assert_eq!(
            qty,
            vec![dec!(23), dec!(5), dec!(3), dec!(2), dec!(2), dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)]
        );
        assert_eq!(plan.leftover, dec!(0));
        assert!(plan.leftover < dec!(10));
        assert_eq!(plan.total_cost() + plan.leftover, dec!(1000));
    }

    #[test]
    fn test_plan_leftover_below_first_price() {
        let prices = vec![Some(dec!(33)), Some(dec!(7))];
        let plan = build_equal_weight_plan(dec!(500), &quotes(&prices));
        // slice 50: 1 x 33, 7 x 7 = 82 spent, 418 left -> 12 more x 33 = 396, 22 left
        assert_eq!(plan.items[0].quantity, dec!(13));
        assert_eq!(plan.items[1].quantity, dec!(7));
        assert_eq!(plan.leftover, dec!(22));
        assert!(plan.leftover < dec!(33));
    }

    #[test]
    fn test_plan_uses_only_first_ten_rows() {
        let prices: Vec<Option<Decimal>> = (0..12).map(|_| Some(dec!(1))).collect();
        let plan = build_equal_weight_plan(dec!(100), &quotes(&prices));
        assert_eq!(plan.items.len(), PLAN_TARGET_COUNT);
        assert_eq!(plan.leftover, dec!(0));
    }

    #[test]
    fn test_plan_missing_price_gets_nothing() {
        let prices = vec![Some(dec!(10)), None, Some(dec!(0))];
        let plan = build_equal_weight_plan(dec!(100), &quotes(&prices));
        assert_eq!(plan.items[1].quantity, dec!(0));
        assert_eq!(plan.items[2].quantity, dec!(0));
        // everything flows into the first row
        assert_eq!(plan.items[0].quantity, dec!(10));
        assert_eq!(plan.leftover, dec!(0));
    }

    #[test]
    fn test_plan_first_row_without_price_keeps_leftover() {
        let prices = vec![None, Some(dec!(10))];
        let plan = build_equal_weight_plan(dec!(100), &quotes(&prices));
        assert_eq!(plan.items[0].quantity, dec!(0));
        assert_eq!(plan.items[1].quantity, dec!(1));
        assert_eq!(plan.leftover, dec!(90));
    }

    #[test]
    fn test_plan_tiny_price_buys_nothing() {
        // 100 / 1e-27 shares does not fit in a Decimal
        let prices = vec![Some(dec!(0.000000000000000000000000001)), Some(dec!(10))];
        let plan = build_equal_weight_plan(dec!(1000), &quotes(&prices));
        assert_eq!(plan.items[0].quantity, dec!(0));
        assert_eq!(plan.items[1].quantity, dec!(10));
        assert_eq!(plan.leftover, dec!(900));
    }

    #[test]
    fn test_cart_breakdown_huge_values() {
        let cart = vec![CartItem {
            ticker: "BIG".into(),
            price: Decimal::MAX,
            quantity: dec!(2),
        }];
        let summary = cart_breakdown(&Portfolio::new(), &cart);
        assert_eq!(summary.cart_total, Decimal::MAX);
        assert_eq!(summary.lines[0].cart_pct, dec!(100));
    }

    #[test]
    fn test_plan_empty_cases() {
        let prices = vec![Some(dec!(10))];
        assert_eq!(build_equal_weight_plan(dec!(0), &quotes(&prices)), BuyPlan::default());
        assert_eq!(build_equal_weight_plan(dec!(-5), &quotes(&prices)), BuyPlan::default());
        assert_eq!(build_equal_weight_plan(dec!(1000), &[]), BuyPlan::default());
    }

    #[test]
    fn test_cart_breakdown() {
        let mut portfolio = Portfolio::new();
        portfolio.merge_holding("ITSA4", dec!(10), dec!(10));

        let cart = vec![
            CartItem { ticker: "ITSA4".into(), price: dec!(10), quantity: dec!(5) },
            CartItem { ticker: "BBAS3".into(), price: dec!(25), quantity: dec!(6) },
        ];
        let summary = cart_breakdown(&portfolio, &cart);

        assert_eq!(summary.cart_total, dec!(200));
        assert_eq!(summary.portfolio_total, dec!(100));
        assert_eq!(summary.combined_total, dec!(300));
        assert_eq!(summary.lines[0].cart_pct, dec!(25));
        assert_eq!(summary.lines[0].portfolio_pct, dec!(50));
        assert_eq!(summary.lines[1].cart_pct, dec!(75));
        assert_eq!(summary.lines[1].portfolio_pct, dec!(50));
    }

    #[test]
    fn test_cart_breakdown_empty_cart() {
        let summary = cart_breakdown(&Portfolio::new(), &[]);
        assert!(summary.lines.is_empty());
        assert_eq!(summary.combined_total, dec!(0));
    }

    #[test]
    fn test_ranked_quote_accepts_null_price() {
        let q: RankedQuote =
            serde_json::from_str(r#"{"ticker":"ITSA4","price":null,"final_rank":3}"#).unwrap();
        assert_eq!(q.price, None);
        let q: RankedQuote = serde_json::from_str(r#"{"ticker":"ITSA4","price":10.5}"#).unwrap();
        assert_eq!(q.price, Some(dec!(10.5)));
        assert_eq!(q.final_rank, None);
    }
}
