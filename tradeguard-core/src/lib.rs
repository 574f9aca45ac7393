//! TradeGuard Core: point-in-time backtest engine, execution simulation and
//! risk interlocks.
//!
//! This crate contains:
//! - Domain types (bars, ticks, news, decisions, orders, fills, positions)
//! - Market-data access with point-in-time gating (strict or lenient)
//! - Execution simulator with a pluggable cost model, ArrivalVWAP and
//!   TickFlowMeter
//! - ExecutionWatchdog and the portfolio-wide KillSwitch
//! - PortfolioLedger (single writer) and PerformanceAnalyzer
//! - BacktestEngine driven by a TemporalClock
//! - Shadow execution of parent orders against tick streams

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod ledger;
pub mod live;
pub mod performance;
pub mod risk;

pub use config::{ConfigError, CostConfig, EngineConfig};
pub use engine::{run_backtest, BacktestEngine, BacktestResult, EngineError, Strategy, StrategyContext};
pub use performance::{PerformanceAnalyzer, PerformanceReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared types can cross threads.
    ///
    /// Sweeps run one engine per rayon worker and the kill switch is shared
    /// between live order paths, so these must stay Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Tick>();
        require_sync::<domain::Tick>();
        require_send::<domain::Decision>();
        require_sync::<domain::Decision>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();

        // Engine
        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();
        require_send::<BacktestEngine>();
        require_sync::<BacktestEngine>();
        require_send::<BacktestResult>();
        require_sync::<BacktestResult>();
        require_send::<ledger::PortfolioLedger>();
        require_sync::<ledger::PortfolioLedger>();

        // Risk
        require_send::<risk::KillSwitchHandle>();
        require_sync::<risk::KillSwitchHandle>();
        require_send::<risk::ExecutionWatchdog>();
        require_sync::<risk::ExecutionWatchdog>();

        // Execution
        require_send::<execution::ExecutionSimulator>();
        require_send::<execution::TickFlowMeter>();
        require_sync::<execution::TickFlowMeter>();
        require_send::<live::ShadowSession>();
    }

    /// The strategy only sees what the engine puts in its context: the
    /// ledger is not reachable through `StrategyContext`, only copies of
    /// cash/equity and a shared reference to its own position.
    #[test]
    fn strategy_context_has_no_ledger_access() {
        fn _check<'a>(ctx: &StrategyContext<'a>) -> (f64, f64, Option<&'a domain::Position>) {
            (ctx.cash, ctx.equity, ctx.position)
        }
    }
}
