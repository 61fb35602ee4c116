// replay-core: deterministic market replay and execution simulation.
// correctness-first architecture: one logical clock, no wall time, no
// randomness. the same recorded streams always produce the same fills.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, OrderId, Side, Price, Quote, Timestamp
//   2.x  events.rs: market event model: depth, trade, mark, ticker, OI, liq
//   3.x  replay.rs: k-way time merge of sorted streams + time slicing
//   4.x  book.rs: L2 order book reconstruction + impact VWAP
//   5.x  taker.rs: taker fill simulation with self-impact
//   6.x  queue_model.rs: maker queue position model
//   7.x  portfolio.rs: positions, realized PnL, funding settlement
//   8.x  broker.rs: simulated broker: admission, latency, fees, fills
//   9.x  engine/: configuration, replay loop, results
//   10.x order.rs: order and fill records
//   11.x strategy.rs: strategy callback trait
//   12.x analytics.rs: round trips, summaries, drawdown

// market data pipeline
pub mod book;
pub mod events;
pub mod replay;
pub mod types;

// execution simulation
pub mod broker;
pub mod order;
pub mod portfolio;
pub mod queue_model;
pub mod taker;

// engine and strategy surface
pub mod analytics;
pub mod engine;
pub mod strategy;

// re exports for convenience
pub use analytics::*;
pub use book::*;
pub use broker::*;
pub use engine::*;
pub use events::*;
pub use order::*;
pub use portfolio::*;
pub use queue_model::*;
pub use replay::*;
pub use strategy::*;
pub use taker::*;
pub use types::*;
