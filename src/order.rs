// 10.0: order and fill records. orders here are simulation-side objects: the
// book is reconstructed L2 depth, so there are no exchange order ids to match
// against. lifecycle is tracked per order and terminates on full fill,
// cancel, or rejection.

use crate::types::{OrderId, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order time in force options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till canceled. Rests on the book until filled or canceled.
    #[default]
    GTC,
    /// Immediate or cancel. Fill what is possible, discard the rest.
    IOC,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Executes at best available prices.
    Market,
    /// Limit order with a specified price.
    Limit,
}

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted but not yet live (submit latency pending).
    PendingNew,
    /// Resting as a maker order.
    Open,
    /// Fully filled.
    Filled,
    /// Canceled by the strategy or by IOC expiry.
    Canceled,
    /// Rejected at admission (post-only crossing, missing limit price).
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected)
    }
}

/// A simulated order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Price>,
    pub time_in_force: TimeInForce,
    pub post_only: bool,
    pub created_at: Timestamp,
}

impl Order {
    pub fn new_market(
        id: OrderId,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            time_in_force: TimeInForce::IOC,
            post_only: false,
            created_at: timestamp,
        }
    }

    pub fn new_limit(
        id: OrderId,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Price,
        time_in_force: TimeInForce,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            time_in_force,
            post_only: false,
            created_at: timestamp,
        }
    }

    pub fn post_only(mut self) -> Self {
        debug_assert!(self.order_type == OrderType::Limit);
        self.post_only = true;
        self
    }
}

/// Which side of the trade provided liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liquidity {
    Maker,
    Taker,
}

/// A simulated execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Price,
    pub fee: Quote,
    pub event_time: Timestamp,
    pub liquidity: Liquidity,
}
