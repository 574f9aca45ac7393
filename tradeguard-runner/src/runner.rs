//! Single-run orchestration: config → data → strategy → engine → report.
//!
//! Two entry points:
//! - `run_from_config()`: loads data for the config, then runs. Used by the CLI.
//! - `run_with_feed()`: runs against an already-loaded feed. Used by sweeps so
//!   every grid point replays the same data without re-reading it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tradeguard_core::data::MarketDataFeed;
use tradeguard_core::engine::CancellationToken;
use tradeguard_core::{BacktestEngine, BacktestResult, EngineError};

use crate::config::{ConfigError, RunConfig};
use crate::data_loader::{load_feed, DataSource, LoadError, LoadedData};
use crate::strategies::build_strategy;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything persisted for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub config: RunConfig,
    pub data_source: DataSource,
    pub dataset_hash: String,
    pub bar_counts: BTreeMap<String, usize>,
    pub result: BacktestResult,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunReport {
    pub fn is_synthetic(&self) -> bool {
        self.data_source == DataSource::Synthetic
    }
}

/// Load the configured data and run once.
pub fn run_from_config(config: &RunConfig) -> Result<RunReport, RunError> {
    run_from_config_with_cancel(config, CancellationToken::new())
}

/// As [`run_from_config`], stopping early when `cancel` fires.
pub fn run_from_config_with_cancel(
    config: &RunConfig,
    cancel: CancellationToken,
) -> Result<RunReport, RunError> {
    config.validate()?;
    let LoadedData {
        feed,
        source,
        dataset_hash,
        bar_counts,
        ..
    } = load_feed(config)?;
    info!(
        source = ?source,
        tickers = bar_counts.len(),
        dataset = %&dataset_hash[..12],
        "data loaded"
    );

    let result = run_with_feed(config, Arc::new(feed), cancel)?;
    let run_id = result.run_id.clone().unwrap_or_default();

    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        config: config.clone(),
        data_source: source,
        dataset_hash,
        bar_counts,
        result,
    })
}

/// Run `config` against `feed`. Builds a fresh engine, kill switch and
/// strategy; nothing is shared with other runs except the read-only feed.
pub fn run_with_feed(
    config: &RunConfig,
    feed: Arc<dyn MarketDataFeed>,
    cancel: CancellationToken,
) -> Result<BacktestResult, RunError> {
    let run_id = config.run_id()?;
    let mut strategy = build_strategy(&config.strategy);
    let engine = BacktestEngine::new(feed, config.engine_config())?.with_cancellation(cancel);

    let mut result = engine.run(
        &mut strategy,
        &config.backtest.tickers,
        config.start(),
        config.end(),
    )?;
    result.run_id = Some(run_id.clone());

    info!(
        run_id = %&run_id[..12],
        strategy = %result.strategy,
        final_equity = result.final_equity,
        total_return = result.total_return,
        sharpe = result.sharpe_ratio,
        max_drawdown = result.max_drawdown,
        fills = result.total_trades,
        rejections = result.rejections.len(),
        halted = result.halted(),
        "run complete"
    );
    Ok(result)
}
