// 4.0: L2 order book reconstruction. one ordered map per side keyed by price,
// so best-level lookups are logarithmic and there is a single source of truth
// for depth. 4.2 has the impact-vwap query.

use crate::events::LevelDelta;
use crate::types::{Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Which side of the book a level lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookSide {
    Bid,
    Ask,
}

// 4.1: liquidity query outcomes that are not a number. distinct variants so a
// caller can tell "book side is empty" from "book has depth but not enough".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LiquidityError {
    #[error("book side is empty")]
    EmptySide,

    #[error("insufficient depth within the walked levels")]
    InsufficientDepth,
}

/// In-memory L2 book. Invariant: no zero-quantity level is ever stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct L2Book {
    bids: BTreeMap<Price, Decimal>,
    asks: BTreeMap<Price, Decimal>,
}

impl L2Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single level update. `qty <= 0` removes the level.
    pub fn apply_level(&mut self, side: BookSide, price: Price, qty: Decimal) {
        let map = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };

        if qty <= Decimal::ZERO {
            map.remove(&price);
        } else {
            map.insert(price, qty);
        }
    }

    /// Apply one depth message atomically.
    pub fn apply_depth_update(&mut self, bid_deltas: &[LevelDelta], ask_deltas: &[LevelDelta]) {
        for d in bid_deltas {
            self.apply_level(BookSide::Bid, d.price, d.qty);
        }
        for d in ask_deltas {
            self.apply_level(BookSide::Ask, d.price, d.qty);
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                Some(Price::new_unchecked((bid.value() + ask.value()) / Decimal::TWO))
            }
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.value() - bid.value()),
            _ => None,
        }
    }

    /// Best bid at or above best ask. A healthy feed never produces this; the
    /// engine counts it as a data anomaly.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Visible quantity at an exact price level, zero if absent.
    pub fn level_qty(&self, side: BookSide, price: Price) -> Decimal {
        let map = match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        };
        map.get(&price).copied().unwrap_or(Decimal::ZERO)
    }

    /// Top `n` levels, best first.
    pub fn depth(&self, side: BookSide, n: usize) -> Vec<(Price, Decimal)> {
        match side {
            BookSide::Bid => self.bids.iter().rev().take(n).map(|(p, q)| (*p, *q)).collect(),
            BookSide::Ask => self.asks.iter().take(n).map(|(p, q)| (*p, *q)).collect(),
        }
    }

    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Iterate the opposite side best-outward for an aggressing `side`:
    /// a buy consumes asks ascending, a sell consumes bids descending.
    pub(crate) fn opposite_levels(&self, side: Side) -> Box<dyn Iterator<Item = (Price, Decimal)> + '_> {
        match side {
            Side::Buy => Box::new(self.asks.iter().map(|(p, q)| (*p, *q))),
            Side::Sell => Box::new(self.bids.iter().rev().map(|(p, q)| (*p, *q))),
        }
    }

    pub(crate) fn remove_opposite(&mut self, side: Side, price: Price) {
        match side {
            Side::Buy => self.asks.remove(&price),
            Side::Sell => self.bids.remove(&price),
        };
    }

    pub(crate) fn set_opposite(&mut self, side: Side, price: Price, qty: Decimal) {
        match side {
            Side::Buy => self.asks.insert(price, qty),
            Side::Sell => self.bids.insert(price, qty),
        };
    }

    // 4.2: volume-weighted average price to execute `target_notional` against
    // current depth. Walks the opposite side best-outward, partially consuming
    // only the final level. `max_levels` caps the walk; exhausting depth or
    // the cap before reaching the target is an explicit error, never a number.
    pub fn impact_vwap(
        &self,
        side: Side,
        target_notional: Quote,
        max_levels: usize,
        eps_notional: Quote,
    ) -> Result<Price, LiquidityError> {
        debug_assert!(target_notional.value() > Decimal::ZERO);

        let mut remaining = target_notional.value();
        let mut total_qty = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        let mut walked = 0usize;

        for (price, qty) in self.opposite_levels(side) {
            if remaining <= eps_notional.value() {
                break;
            }
            if max_levels > 0 && walked >= max_levels {
                break;
            }
            walked += 1;

            let level_notional = price.value() * qty;
            let take_notional = level_notional.min(remaining);
            let take_qty = take_notional / price.value();

            total_cost += take_qty * price.value();
            total_qty += take_qty;
            remaining -= take_notional;
        }

        if total_qty.is_zero() {
            return Err(LiquidityError::EmptySide);
        }
        if remaining > eps_notional.value() {
            return Err(LiquidityError::InsufficientDepth);
        }

        Ok(Price::new_unchecked(total_cost / total_qty))
    }
}

// 4.3: per-symbol book registry. books are created lazily on first use and
// live for the whole run.
#[derive(Debug, Clone, Default)]
pub struct BookSet {
    books: HashMap<Symbol, L2Book>,
}

impl BookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn book(&self, symbol: &Symbol) -> Option<&L2Book> {
        self.books.get(symbol)
    }

    pub fn book_mut(&mut self, symbol: &Symbol) -> &mut L2Book {
        self.books.entry(symbol.clone()).or_default()
    }

    pub fn mid_price(&self, symbol: &Symbol) -> Option<Price> {
        self.books.get(symbol).and_then(|b| b.mid_price())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &L2Book)> {
        self.books.iter()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

/// Default level cap for impact queries.
pub const DEFAULT_IMPACT_MAX_LEVELS: usize = 200;

/// Default slack when matching the target notional.
pub fn default_eps_notional() -> Quote {
    Quote::new(Decimal::new(1, 6))
}
