// 9.1: engine knobs. Like the broker config, validated once up front.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Spacing of the strategy tick grid, simulation-clock ms. Ticks fire on
    /// absolute multiples of this interval, independent of event times.
    pub tick_interval_ms: i64,

    /// Submissions before this instant are rejected. `None` = no bound.
    pub trading_start: Option<Timestamp>,
    /// Submissions at or after this instant are rejected. `None` = no bound.
    pub trading_end: Option<Timestamp>,

    /// Print fills and funding applications as they happen.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            trading_start: None,
            trading_end: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineConfigError {
    #[error("tick_interval_ms must be > 0, got {0}")]
    InvalidTickInterval(i64),

    #[error("trading_start {0} must precede trading_end {1}")]
    InvalidTradingWindow(Timestamp, Timestamp),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.tick_interval_ms <= 0 {
            return Err(EngineConfigError::InvalidTickInterval(self.tick_interval_ms));
        }
        if let (Some(start), Some(end)) = (self.trading_start, self.trading_end) {
            if start >= end {
                return Err(EngineConfigError::InvalidTradingWindow(start, end));
            }
        }
        Ok(())
    }
}
