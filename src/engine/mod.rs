// 9.0: deterministic replay engine.
//   9.1: config.rs   — run configuration + validation
//   9.2: core.rs     — EngineContext and the BacktestEngine loop
//   9.3: results.rs  — BacktestResult and anomaly counters

mod config;
mod core;
mod results;

pub use config::{EngineConfig, EngineConfigError};
pub use core::{BacktestEngine, EngineContext};
pub use results::{AnomalyCounters, BacktestResult};
