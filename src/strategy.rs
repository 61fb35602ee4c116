// 11.0: strategy callback surface. Implementations see every merged market
// event plus a fixed-interval tick, and act through the engine context.

use crate::engine::EngineContext;
use crate::events::MarketEvent;
use crate::types::Timestamp;

/// Callbacks fired by the engine. All methods default to no-ops so a
/// strategy only implements the hooks it cares about.
///
/// Ordering guarantees per event: internal state (books, broker, marks) is
/// updated first, then `on_event` fires. Ticks fire before any event at or
/// past the tick boundary, `on_time` before `on_tick`.
pub trait Strategy {
    /// Called once before the first event.
    fn on_start(&mut self, _ctx: &mut EngineContext) {}

    /// Called on the fixed tick grid.
    fn on_tick(&mut self, _ctx: &mut EngineContext, _now: Timestamp) {}

    /// Called after each market event has been applied to engine state.
    fn on_event(&mut self, _ctx: &mut EngineContext, _event: &MarketEvent) {}

    /// Called once after the last event.
    fn on_end(&mut self, _ctx: &mut EngineContext) {}
}

/// Passive strategy. Useful for replay-only runs and tests that exercise
/// the engine plumbing without trading.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStrategy;

impl Strategy for NoopStrategy {}
