// 9.3: run outputs. Anomaly counters record feed-quality observations; they
// never abort a run.

use crate::analytics::{round_trips_from_fills, RoundTrip};
use crate::order::Fill;
use crate::types::{Quote, Timestamp};
use serde::{Deserialize, Serialize};

/// Data-quality observations accumulated over a run. Each counter is
/// diagnostic only; the engine keeps going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyCounters {
    /// Events whose timestamp regressed behind the engine clock.
    pub out_of_order_events: u64,
    /// Depth updates whose final update id did not advance.
    pub duplicate_depth_updates: u64,
    /// Depth updates whose previous-final id did not chain to the last seen.
    pub depth_continuity_gaps: u64,
    /// Times a book was observed with best bid >= best ask after an update.
    pub crossed_book_observations: u64,
}

impl AnomalyCounters {
    pub fn total(&self) -> u64 {
        self.out_of_order_events
            + self.duplicate_depth_updates
            + self.depth_continuity_gaps
            + self.crossed_book_observations
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Everything a completed run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub fills: Vec<Fill>,
    pub realized_pnl: Quote,
    pub fees_paid: Quote,
    /// Equity at the final tick, marked with the latest mark prices.
    pub final_equity: Quote,
    /// Equity sampled at every tick.
    pub equity_curve: Vec<(Timestamp, Quote)>,
    pub anomalies: AnomalyCounters,
    pub events_processed: u64,
    pub ticks_fired: u64,
}

impl BacktestResult {
    pub fn round_trips(&self) -> Vec<RoundTrip> {
        round_trips_from_fills(&self.fills)
    }
}
