//! Backtesting engine: simulated clock, point-in-time data access and the
//! per-step orchestration of strategy, execution, ledger and risk checks.
//!
//! Each step:
//! 1. Roll the trading day (daily counters, optional watchdog reset).
//! 2. For each ticker in fixed order: fetch as-of data, gate it, exit on
//!    stop-loss, ask the strategy, route the decision through execution.
//! 3. Append one equity snapshot.
//! 4. Evaluate the kill switch against the post-step trading state.

pub mod backtest;
pub mod cancel;
pub mod clock;
pub mod result;
pub mod strategy;

pub use backtest::{run_backtest, BacktestEngine, EngineError};
pub use cancel::CancellationToken;
pub use clock::TemporalClock;
pub use result::{BacktestResult, DataErrorRecord, RejectionRecord};
pub use strategy::{HoldStrategy, ScriptedStrategy, Strategy, StrategyContext};
