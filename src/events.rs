// 2.0: the market event model. six event kinds, one closed enum, all timestamped
// in UTC milliseconds. `event_time` is the ordering key of the merged replay
// stream; everything downstream dispatches on this enum exactly once.

use crate::types::{Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single L2 level change. `qty == 0` deletes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDelta {
    pub price: Price,
    pub qty: Decimal,
}

impl LevelDelta {
    pub fn new(price: Price, qty: Decimal) -> Self {
        Self { price, qty }
    }
}

// 2.1: incremental depth message. update ids follow the Binance continuity
// contract: a gapless feed has prev_final_update_id == previous message's
// final_update_id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub event_time: Timestamp,
    pub transaction_time: Timestamp,
    pub symbol: Symbol,

    pub first_update_id: u64,
    pub final_update_id: u64,
    pub prev_final_update_id: u64,

    pub bid_deltas: Vec<LevelDelta>,
    pub ask_deltas: Vec<LevelDelta>,
}

// 2.2: trade print. `buyer_is_maker == true` means the aggressor sold into the
// bids; false means the aggressor bought from the asks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub event_time: Timestamp,
    pub trade_time: Timestamp,
    pub symbol: Symbol,

    pub trade_id: u64,
    pub price: Price,
    pub quantity: Decimal,
    pub buyer_is_maker: bool,
}

impl Trade {
    /// Side of the aggressing order.
    pub fn aggressor_side(&self) -> Side {
        if self.buyer_is_maker {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

// 2.3: mark price + funding update. `next_funding_time` is the funding epoch
// this message points at; a non-positive value means the feed carries no
// funding schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub event_time: Timestamp,
    pub symbol: Symbol,

    pub mark_price: Price,
    pub index_price: Price,
    pub funding_rate: Decimal,
    pub next_funding_time: Timestamp,
}

/// Aggregated 24h rolling-window ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub event_time: Timestamp,
    pub symbol: Symbol,

    pub price_change_percent: Decimal,
    pub weighted_average_price: Price,
    pub last_price: Price,
    pub last_quantity: Decimal,
    pub open_price: Price,
    pub high_price: Price,
    pub low_price: Price,
    pub base_asset_volume: Decimal,
    pub quote_asset_volume: Decimal,

    pub statistics_open_time: Timestamp,
    pub statistics_close_time: Timestamp,
    pub total_trades: u64,
}

// 2.4: open interest snapshot, typically low frequency (e.g. 5m). `event_time`
// is when the strategy may see it; `measured_at` is the dataset measurement
// time. The adapter may push event_time later to avoid look-ahead bias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub event_time: Timestamp,
    pub measured_at: Timestamp,
    pub symbol: Symbol,

    pub open_interest: Decimal,
    pub open_interest_value: Quote,
}

/// Forced liquidation order from the liquidation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liquidation {
    pub event_time: Timestamp,
    pub trade_time: Timestamp,
    pub symbol: Symbol,

    pub side: Side,
    pub price: Price,
    pub average_price: Price,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
}

// 2.5: the closed sum type the engine dispatches on. adding a kind here forces
// every match in the crate to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    Depth(DepthUpdate),
    Trade(Trade),
    Mark(MarkPrice),
    Ticker(Ticker),
    OpenInterest(OpenInterest),
    Liquidation(Liquidation),
}

impl MarketEvent {
    pub fn event_time(&self) -> Timestamp {
        match self {
            MarketEvent::Depth(e) => e.event_time,
            MarketEvent::Trade(e) => e.event_time,
            MarketEvent::Mark(e) => e.event_time,
            MarketEvent::Ticker(e) => e.event_time,
            MarketEvent::OpenInterest(e) => e.event_time,
            MarketEvent::Liquidation(e) => e.event_time,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketEvent::Depth(e) => &e.symbol,
            MarketEvent::Trade(e) => &e.symbol,
            MarketEvent::Mark(e) => &e.symbol,
            MarketEvent::Ticker(e) => &e.symbol,
            MarketEvent::OpenInterest(e) => &e.symbol,
            MarketEvent::Liquidation(e) => &e.symbol,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::Depth(_) => "depth",
            MarketEvent::Trade(_) => "trade",
            MarketEvent::Mark(_) => "mark_price",
            MarketEvent::Ticker(_) => "ticker",
            MarketEvent::OpenInterest(_) => "open_interest",
            MarketEvent::Liquidation(_) => "liquidation",
        }
    }
}
