// 5.0: taker fill simulation. a pure walk over opposite-side depth, and a
// mutating sibling that applies self-impact so later queries in the same run
// see reduced depth.

use crate::book::L2Book;
use crate::types::{Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of a taker walk. `filled_qty` may be less than requested when depth
/// or the limit price exhausts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakerFill {
    pub avg_price: Price,
    pub filled_qty: Decimal,
}

fn beyond_limit(side: Side, price: Price, limit_price: Option<Price>) -> bool {
    match (side, limit_price) {
        (Side::Buy, Some(limit)) => price > limit,
        (Side::Sell, Some(limit)) => price < limit,
        (_, None) => false,
    }
}

// 5.1: pure simulation: BUY walks asks ascending, SELL walks bids descending,
// never executing beyond `limit_price`. Returns None when nothing executes.
pub fn simulate_taker_fill(
    book: &L2Book,
    side: Side,
    quantity: Decimal,
    limit_price: Option<Price>,
) -> Option<TakerFill> {
    debug_assert!(quantity > Decimal::ZERO);

    let mut remaining = quantity;
    let mut filled = Decimal::ZERO;
    let mut cost = Decimal::ZERO;

    for (price, lvl_qty) in book.opposite_levels(side) {
        if remaining <= Decimal::ZERO {
            break;
        }
        if beyond_limit(side, price, limit_price) {
            break;
        }

        let take = lvl_qty.min(remaining);
        filled += take;
        cost += take * price.value();
        remaining -= take;
    }

    if filled <= Decimal::ZERO {
        return None;
    }

    Some(TakerFill {
        avg_price: Price::new_unchecked(cost / filled),
        filled_qty: filled,
    })
}

// 5.2: same computation with self-impact: every simulated unit taken is
// removed from the book, fully consumed levels are deleted.
pub fn consume_taker_fill(
    book: &mut L2Book,
    side: Side,
    quantity: Decimal,
    limit_price: Option<Price>,
) -> Option<TakerFill> {
    debug_assert!(quantity > Decimal::ZERO);

    let mut remaining = quantity;
    let mut filled = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    let mut consumed: Vec<(Price, Decimal, Decimal)> = Vec::new();

    for (price, lvl_qty) in book.opposite_levels(side) {
        if remaining <= Decimal::ZERO {
            break;
        }
        if beyond_limit(side, price, limit_price) {
            break;
        }

        let take = lvl_qty.min(remaining);
        filled += take;
        cost += take * price.value();
        remaining -= take;
        consumed.push((price, lvl_qty, take));
    }

    if filled <= Decimal::ZERO {
        return None;
    }

    for (price, lvl_qty, take) in consumed {
        let left = lvl_qty - take;
        if left <= Decimal::ZERO {
            book.remove_opposite(side, price);
        } else {
            book.set_opposite(side, price, left);
        }
    }

    Some(TakerFill {
        avg_price: Price::new_unchecked(cost / filled),
        filled_qty: filled,
    })
}
