// 6.0: approximate maker queue-position model. we cannot see the real queue,
// so the model assumes the order joins behind everything visible at its price
// level and only ever moves forward.
//
// Progression rules:
// - book level qty decreases at our price -> cancels/executions ahead of us,
//   queue_ahead_qty drops to the new visible qty. Increases are ignored (new
//   size queues behind us).
// - trade prints at exactly our price, aggressing our side -> queue_ahead_qty
//   absorbs trade_qty * participation first; overflow credits our own fill.
//
// Trade credit is exact-price-only. Trades one tick away do not erode queue
// position; this is a documented approximation of real price-time priority.

use crate::events::Trade;
use crate::types::{OrderId, Price, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerQueueOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    /// Buy rests on the bid; sell rests on the ask.
    pub side: Side,
    pub price: Price,
    pub quantity: Decimal,

    /// Visible quantity assumed ahead of us. Non-negative, non-increasing.
    pub queue_ahead_qty: Decimal,
    pub filled_qty: Decimal,
    /// Fraction of tape volume credited to queue progression, in (0, 1].
    pub trade_participation: Decimal,
}

impl MakerQueueOrder {
    pub fn new(
        order_id: OrderId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Decimal,
        queue_ahead_qty: Decimal,
        trade_participation: Decimal,
    ) -> Self {
        debug_assert!(queue_ahead_qty >= Decimal::ZERO);
        debug_assert!(
            trade_participation > Decimal::ZERO && trade_participation <= Decimal::ONE
        );
        Self {
            order_id,
            symbol,
            side,
            price,
            quantity,
            queue_ahead_qty,
            filled_qty: Decimal::ZERO,
            trade_participation,
        }
    }

    pub fn remaining_qty(&self) -> Decimal {
        (self.quantity - self.filled_qty).max(Decimal::ZERO)
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_qty() <= Decimal::ZERO
    }

    /// Update the queue estimate from a book level update at our price.
    /// Only decreases help us; increases are assumed behind us.
    pub fn on_book_qty_update(&mut self, new_visible_qty: Decimal) {
        debug_assert!(new_visible_qty >= Decimal::ZERO);
        if new_visible_qty < self.queue_ahead_qty {
            self.queue_ahead_qty = new_visible_qty;
        }
    }

    // 6.1: consume the trade tape. Returns the quantity this trade filled on
    // our order (zero while the queue ahead still absorbs volume).
    pub fn on_trade(&mut self, trade: &Trade) -> Decimal {
        if trade.symbol != self.symbol || self.is_filled() {
            return Decimal::ZERO;
        }

        // Must print at the exact level we rest on.
        if trade.price != self.price {
            return Decimal::ZERO;
        }

        // A resting bid fills only against a sell aggressor; a resting ask
        // only against a buy aggressor.
        if trade.aggressor_side() == self.side {
            return Decimal::ZERO;
        }

        let credited = trade.quantity * self.trade_participation;
        if credited <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        if self.queue_ahead_qty >= credited {
            self.queue_ahead_qty -= credited;
            return Decimal::ZERO;
        }

        let past_queue = credited - self.queue_ahead_qty;
        self.queue_ahead_qty = Decimal::ZERO;

        let fill = self.remaining_qty().min(past_queue);
        self.filled_qty += fill;
        fill
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, qty: Decimal, buyer_is_maker: bool) -> Trade {
        Trade {
            event_time: Timestamp::from_millis(0),
            trade_time: Timestamp::from_millis(0),
            symbol: Symbol::new("BTCUSDT"),
            trade_id: 1,
            price: Price::new_unchecked(price),
            quantity: qty,
            buyer_is_maker,
        }
    }

    fn resting_bid(queue_ahead: Decimal, participation: Decimal) -> MakerQueueOrder {
        MakerQueueOrder::new(
            OrderId(1),
            Symbol::new("BTCUSDT"),
            Side::Buy,
            Price::new_unchecked(dec!(100)),
            dec!(1),
            queue_ahead,
            participation,
        )
    }

    #[test]
    fn sell_aggressor_advances_bid_queue() {
        let mut mo = resting_bid(dec!(5), dec!(1));
        let filled = mo.on_trade(&trade(dec!(100), dec!(2), true));
        assert_eq!(filled, dec!(0));
        assert_eq!(mo.queue_ahead_qty, dec!(3));
    }

    #[test]
    fn participation_discounts_tape_credit() {
        let mut mo = resting_bid(dec!(5), dec!(0.5));
        mo.on_trade(&trade(dec!(100), dec!(2), true));
        assert_eq!(mo.queue_ahead_qty, dec!(4));
    }

    #[test]
    fn overflow_past_queue_fills_order() {
        let mut mo = resting_bid(dec!(0.5), dec!(1));
        assert_eq!(mo.on_trade(&trade(dec!(100), dec!(0.4), true)), dec!(0));
        assert_eq!(mo.queue_ahead_qty, dec!(0.1));

        let filled = mo.on_trade(&trade(dec!(100), dec!(0.5), true));
        assert_eq!(filled, dec!(0.4));
        assert_eq!(mo.filled_qty, dec!(0.4));
        assert_eq!(mo.queue_ahead_qty, dec!(0));
        assert!(!mo.is_filled());
    }

    #[test]
    fn wrong_aggressor_side_is_ignored() {
        // Buy aggressor lifts asks; it cannot fill our resting bid.
        let mut mo = resting_bid(dec!(1), dec!(1));
        assert_eq!(mo.on_trade(&trade(dec!(100), dec!(5), false)), dec!(0));
        assert_eq!(mo.queue_ahead_qty, dec!(1));
    }

    #[test]
    fn off_level_trade_is_ignored() {
        let mut mo = resting_bid(dec!(1), dec!(1));
        assert_eq!(mo.on_trade(&trade(dec!(99.99), dec!(5), true)), dec!(0));
        assert_eq!(mo.queue_ahead_qty, dec!(1));
    }

    #[test]
    fn book_update_only_decreases_queue_ahead() {
        let mut mo = resting_bid(dec!(2), dec!(1));
        mo.on_book_qty_update(dec!(3));
        assert_eq!(mo.queue_ahead_qty, dec!(2));

        mo.on_book_qty_update(dec!(1.5));
        assert_eq!(mo.queue_ahead_qty, dec!(1.5));
    }

    #[test]
    fn fill_caps_at_remaining_size() {
        let mut mo = resting_bid(dec!(0), dec!(1));
        let filled = mo.on_trade(&trade(dec!(100), dec!(10), true));
        assert_eq!(filled, dec!(1));
        assert!(mo.is_filled());

        // Further tape volume credits nothing once filled.
        assert_eq!(mo.on_trade(&trade(dec!(100), dec!(1), true)), dec!(0));
    }
}
