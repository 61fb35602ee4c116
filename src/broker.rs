// 8.0: simulated broker. owns the portfolio, the order records, the maker
// queue models, and the latency queues. taker fills come from book depth with
// self-impact; maker fills come from the trade tape via the queue model.
// 8.2 has the admission rules, 8.4 the latency scheduling.

use crate::book::{BookSet, BookSide};
use crate::events::{DepthUpdate, Trade};
use crate::order::{Fill, Liquidity, Order, OrderStatus, OrderType, TimeInForce};
use crate::portfolio::Portfolio;
use crate::queue_model::MakerQueueOrder;
use crate::taker::consume_taker_fill;
use crate::types::{OrderId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

// 8.1: broker knobs. validated once at construction; bad values are the only
// fatal error class in the crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub maker_fee_frac: Decimal,
    pub taker_fee_frac: Decimal,

    /// Delay before a submitted order becomes live, simulation-clock ms.
    pub submit_latency_ms: i64,
    /// Delay before a cancel takes effect, simulation-clock ms.
    pub cancel_latency_ms: i64,

    /// Inflates the initial queue-ahead snapshot multiplicatively.
    pub maker_queue_ahead_factor: Decimal,
    /// Inflates the initial queue-ahead snapshot additively.
    pub maker_queue_ahead_extra_qty: Decimal,
    /// Fraction of tape volume credited to queue progression, in (0, 1].
    pub maker_trade_participation: Decimal,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            maker_fee_frac: dec!(0.0004),
            taker_fee_frac: dec!(0.0005),
            submit_latency_ms: 0,
            cancel_latency_ms: 0,
            maker_queue_ahead_factor: dec!(1),
            maker_queue_ahead_extra_qty: dec!(0),
            maker_trade_participation: dec!(1),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("fee fraction must be >= 0, got {0}")]
    NegativeFee(Decimal),

    #[error("latency must be >= 0 ms, got {0}")]
    NegativeLatency(i64),

    #[error("maker_queue_ahead_factor must be >= 0, got {0}")]
    NegativeQueueFactor(Decimal),

    #[error("maker_queue_ahead_extra_qty must be >= 0, got {0}")]
    NegativeQueueExtra(Decimal),

    #[error("maker_trade_participation must be in (0, 1], got {0}")]
    InvalidParticipation(Decimal),
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maker_fee_frac < Decimal::ZERO {
            return Err(ConfigError::NegativeFee(self.maker_fee_frac));
        }
        if self.taker_fee_frac < Decimal::ZERO {
            return Err(ConfigError::NegativeFee(self.taker_fee_frac));
        }
        if self.submit_latency_ms < 0 {
            return Err(ConfigError::NegativeLatency(self.submit_latency_ms));
        }
        if self.cancel_latency_ms < 0 {
            return Err(ConfigError::NegativeLatency(self.cancel_latency_ms));
        }
        if self.maker_queue_ahead_factor < Decimal::ZERO {
            return Err(ConfigError::NegativeQueueFactor(self.maker_queue_ahead_factor));
        }
        if self.maker_queue_ahead_extra_qty < Decimal::ZERO {
            return Err(ConfigError::NegativeQueueExtra(self.maker_queue_ahead_extra_qty));
        }
        if self.maker_trade_participation <= Decimal::ZERO
            || self.maker_trade_participation > Decimal::ONE
        {
            return Err(ConfigError::InvalidParticipation(self.maker_trade_participation));
        }
        Ok(())
    }
}

/// Why an order was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Post-only order would have executed immediately.
    PostOnlyWouldCross,
    /// Limit order submitted without a price.
    MissingLimitPrice,
    /// Submission attempted outside the configured trading window.
    OutsideTradingWindow,
}

/// Submission acknowledgement. With submit latency, `Accepted` means queued;
/// admission rules run when the order goes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitAck {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
struct OrderRecord {
    order: Order,
    status: OrderStatus,
}

// Latency queue entries. Min-heap on (due, seq); seq keeps same-due entries
// in submission order.
#[derive(Debug)]
struct PendingSubmit {
    due: Timestamp,
    seq: u64,
    order: Order,
}

#[derive(Debug)]
struct PendingCancel {
    due: Timestamp,
    seq: u64,
    order_id: OrderId,
}

macro_rules! min_heap_on_due {
    ($t:ty) => {
        impl PartialEq for $t {
            fn eq(&self, other: &Self) -> bool {
                self.due == other.due && self.seq == other.seq
            }
        }
        impl Eq for $t {}
        impl PartialOrd for $t {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for $t {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                (self.due, self.seq).cmp(&(other.due, other.seq)).reverse()
            }
        }
    };
}

min_heap_on_due!(PendingSubmit);
min_heap_on_due!(PendingCancel);

/// Broker simulator. All mutation is driven by the engine in a fixed
/// per-event order, so replays are reproducible.
#[derive(Debug, Default)]
pub struct SimBroker {
    config: BrokerConfig,
    pub portfolio: Portfolio,
    fills: Vec<Fill>,

    records: HashMap<OrderId, OrderRecord>,
    // BTreeMap so per-trade maker iteration is deterministic.
    maker_orders: BTreeMap<OrderId, MakerQueueOrder>,

    pending_submits: BinaryHeap<PendingSubmit>,
    pending_cancels: BinaryHeap<PendingCancel>,
    canceled_before_active: HashSet<OrderId>,
    seq: u64,
}

impl SimBroker {
    pub fn new(config: BrokerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            portfolio: Portfolio::new(),
            fills: Vec::new(),
            records: HashMap::new(),
            maker_orders: BTreeMap::new(),
            pending_submits: BinaryHeap::new(),
            pending_cancels: BinaryHeap::new(),
            canceled_before_active: HashSet::new(),
            seq: 0,
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn order_status(&self, order_id: OrderId) -> Option<OrderStatus> {
        self.records.get(&order_id).map(|r| r.status)
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.records.get(&order_id).map(|r| &r.order)
    }

    pub fn maker_order(&self, order_id: OrderId) -> Option<&MakerQueueOrder> {
        self.maker_orders.get(&order_id)
    }

    pub fn has_open_orders(&self) -> bool {
        !self.maker_orders.is_empty()
    }

    pub fn open_order_count(&self) -> usize {
        self.maker_orders.len()
    }

    fn set_status(&mut self, order_id: OrderId, status: OrderStatus) {
        if let Some(rec) = self.records.get_mut(&order_id) {
            rec.status = status;
        }
    }

    // 8.2: submit an order. With `submit_latency_ms > 0` activation is
    // deferred to `on_time` and the ack means "queued"; admission rules
    // (post-only crossing) run against the book as of activation.
    pub fn submit(&mut self, order: Order, books: &mut BookSet, now: Timestamp) -> SubmitAck {
        if order.order_type == OrderType::Limit && order.price.is_none() {
            self.records.insert(
                order.id,
                OrderRecord {
                    order,
                    status: OrderStatus::Rejected,
                },
            );
            return SubmitAck::Rejected(RejectReason::MissingLimitPrice);
        }

        if self.config.submit_latency_ms > 0 {
            self.records.insert(
                order.id,
                OrderRecord {
                    order: order.clone(),
                    status: OrderStatus::PendingNew,
                },
            );
            self.seq += 1;
            self.pending_submits.push(PendingSubmit {
                due: now.add_millis(self.config.submit_latency_ms),
                seq: self.seq,
                order,
            });
            return SubmitAck::Accepted;
        }

        self.records.insert(
            order.id,
            OrderRecord {
                order: order.clone(),
                status: OrderStatus::PendingNew,
            },
        );
        self.submit_now(order, books, now)
    }

    fn submit_now(&mut self, order: Order, books: &mut BookSet, now: Timestamp) -> SubmitAck {
        if order.order_type == OrderType::Market {
            let filled = self.fill_taker(&order, books, now, None);
            let status = if filled >= order.quantity {
                OrderStatus::Filled
            } else {
                OrderStatus::Canceled
            };
            self.set_status(order.id, status);
            return SubmitAck::Accepted;
        }

        let Some(limit_px) = order.price else {
            self.set_status(order.id, OrderStatus::Rejected);
            return SubmitAck::Rejected(RejectReason::MissingLimitPrice);
        };

        let book = books.book_mut(&order.symbol);
        let crosses = match order.side {
            // Buy crosses if it reaches the ask; sell crosses if it reaches the bid.
            Side::Buy => book.best_ask().is_some_and(|ask| limit_px >= ask),
            Side::Sell => book.best_bid().is_some_and(|bid| limit_px <= bid),
        };

        if order.post_only {
            if crosses {
                self.set_status(order.id, OrderStatus::Rejected);
                return SubmitAck::Rejected(RejectReason::PostOnlyWouldCross);
            }
            self.open_maker(&order, limit_px, order.quantity, books);
            self.set_status(order.id, OrderStatus::Open);
            return SubmitAck::Accepted;
        }

        if order.time_in_force == TimeInForce::IOC {
            let filled = self.fill_taker(&order, books, now, Some(limit_px));
            let status = if filled >= order.quantity {
                OrderStatus::Filled
            } else {
                // IOC never rests; the remainder is discarded.
                OrderStatus::Canceled
            };
            self.set_status(order.id, status);
            return SubmitAck::Accepted;
        }

        // GTC limit: a crossing portion executes immediately as taker, the
        // unfilled remainder rests at the limit price.
        if crosses {
            let filled = self.fill_taker(&order, books, now, Some(limit_px));
            let remaining = order.quantity - filled;
            if remaining > Decimal::ZERO {
                self.open_maker(&order, limit_px, remaining, books);
                self.set_status(order.id, OrderStatus::Open);
            } else {
                self.set_status(order.id, OrderStatus::Filled);
            }
            return SubmitAck::Accepted;
        }

        self.open_maker(&order, limit_px, order.quantity, books);
        self.set_status(order.id, OrderStatus::Open);
        SubmitAck::Accepted
    }

    // 8.3: rest a maker order. The queue snapshot is the visible quantity at
    // our level, inflated by the conservatism knobs.
    fn open_maker(&mut self, order: &Order, price: Price, quantity: Decimal, books: &mut BookSet) {
        let book = books.book_mut(&order.symbol);
        let level_side = match order.side {
            Side::Buy => BookSide::Bid,
            Side::Sell => BookSide::Ask,
        };
        let visible = book.level_qty(level_side, price);
        let queue_ahead = visible * self.config.maker_queue_ahead_factor
            + self.config.maker_queue_ahead_extra_qty;

        self.maker_orders.insert(
            order.id,
            MakerQueueOrder::new(
                order.id,
                order.symbol.clone(),
                order.side,
                price,
                quantity,
                queue_ahead,
                self.config.maker_trade_participation,
            ),
        );
    }

    fn fill_taker(
        &mut self,
        order: &Order,
        books: &mut BookSet,
        now: Timestamp,
        limit_price: Option<Price>,
    ) -> Decimal {
        let book = books.book_mut(&order.symbol);
        let Some(fill) = consume_taker_fill(book, order.side, order.quantity, limit_price) else {
            return Decimal::ZERO;
        };

        let fee = Quote::new(fill.filled_qty * fill.avg_price.value() * self.config.taker_fee_frac);
        self.portfolio
            .apply_fill(&order.symbol, order.side, fill.filled_qty, fill.avg_price, fee);
        self.fills.push(Fill {
            order_id: order.id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: fill.filled_qty,
            price: fill.avg_price,
            fee,
            event_time: now,
            liquidity: Liquidity::Taker,
        });
        fill.filled_qty
    }

    /// Cancel an order, immediately or after `cancel_latency_ms`. Also covers
    /// orders submitted but not yet live.
    pub fn cancel(&mut self, order_id: OrderId, now: Timestamp) {
        if self.config.cancel_latency_ms > 0 {
            self.seq += 1;
            self.pending_cancels.push(PendingCancel {
                due: now.add_millis(self.config.cancel_latency_ms),
                seq: self.seq,
                order_id,
            });
            return;
        }
        self.cancel_now(order_id);
    }

    fn cancel_now(&mut self, order_id: OrderId) {
        if self.maker_orders.remove(&order_id).is_some() {
            self.set_status(order_id, OrderStatus::Canceled);
            return;
        }
        // Not live yet: mark it so the pending submission is dropped.
        if self.order_status(order_id) == Some(OrderStatus::PendingNew) {
            self.canceled_before_active.insert(order_id);
            self.set_status(order_id, OrderStatus::Canceled);
        }
    }

    // 8.4: advance broker time. Cancels are applied before submissions so a
    // cancel and an activation due at the same instant resolve conservatively.
    // Called by the engine on every tick and every event.
    pub fn on_time(&mut self, now: Timestamp, books: &mut BookSet) {
        while self
            .pending_cancels
            .peek()
            .is_some_and(|p| p.due <= now)
        {
            let pending = self.pending_cancels.pop().expect("peeked entry exists");
            self.cancel_now(pending.order_id);
        }

        while self
            .pending_submits
            .peek()
            .is_some_and(|p| p.due <= now)
        {
            let pending = self.pending_submits.pop().expect("peeked entry exists");
            if self.canceled_before_active.remove(&pending.order.id) {
                continue;
            }
            self.submit_now(pending.order, books, now);
        }
    }

    /// Apply a depth message to the symbol's book, then advance maker queues
    /// for touched levels on each resting order's side and exact price.
    pub fn on_depth_update(&mut self, update: &DepthUpdate, books: &mut BookSet) {
        let book = books.book_mut(&update.symbol);
        book.apply_depth_update(&update.bid_deltas, &update.ask_deltas);

        let mut done: Vec<OrderId> = Vec::new();
        for (order_id, mo) in self.maker_orders.iter_mut() {
            if mo.symbol != update.symbol {
                continue;
            }
            let touched = match mo.side {
                Side::Buy => &update.bid_deltas,
                Side::Sell => &update.ask_deltas,
            };
            if let Some(delta) = touched.iter().find(|d| d.price == mo.price) {
                mo.on_book_qty_update(delta.qty);
            }
            if mo.is_filled() {
                done.push(*order_id);
            }
        }
        for order_id in done {
            self.maker_orders.remove(&order_id);
            self.set_status(order_id, OrderStatus::Filled);
        }
    }

    /// Feed a trade print to every resting maker order; emit fills for orders
    /// whose queue has been worked off.
    pub fn on_trade(&mut self, trade: &Trade, now: Timestamp) {
        let ids: Vec<OrderId> = self.maker_orders.keys().copied().collect();
        for order_id in ids {
            let Some(mo) = self.maker_orders.get_mut(&order_id) else {
                continue;
            };
            let fill_qty = mo.on_trade(trade);
            if fill_qty <= Decimal::ZERO {
                continue;
            }

            let symbol = mo.symbol.clone();
            let side = mo.side;
            let filled = mo.is_filled();

            let fee = Quote::new(fill_qty * trade.price.value() * self.config.maker_fee_frac);
            self.portfolio.apply_fill(&symbol, side, fill_qty, trade.price, fee);
            self.fills.push(Fill {
                order_id,
                symbol,
                side,
                quantity: fill_qty,
                price: trade.price,
                fee,
                event_time: now,
                liquidity: Liquidity::Maker,
            });

            if filled {
                self.maker_orders.remove(&order_id);
                self.set_status(order_id, OrderStatus::Filled);
            }
        }
    }
}
