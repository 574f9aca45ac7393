//! TradeGuard Runner: backtest orchestration on top of `tradeguard-core`.
//!
//! This crate provides:
//! - TOML run configuration with a deterministic run fingerprint
//! - CSV and seeded synthetic data loading
//! - Rule-based strategy presets
//! - Single-run orchestration and a parallel cost/sizing sweep
//! - JSON and CSV artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod strategies;
pub mod sweep;
pub mod synthetic;

pub use config::{
    ConfigError, DataConfig, RunConfig, RunId, ScheduledOrder, StrategyConfig, SyntheticConfig,
    OVERRIDE_CODE_ENV,
};
pub use data_loader::{load_feed, DataSource, LoadError, LoadedData};
pub use export::{load_artifacts, save_artifacts, save_sweep};
pub use runner::{run_from_config, run_with_feed, RunError, RunReport, SCHEMA_VERSION};
pub use strategies::build_strategy;
pub use sweep::{ParamGrid, ParamSweep, SweepEntry, SweepPoint, SweepResults};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<ParamGrid>();
        assert_sync::<ParamGrid>();
    }

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
    }
}
