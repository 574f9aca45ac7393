//! Parameter sweep over execution costs and position sizing.
//!
//! Every grid point is an independent run: its own engine, ledger,
//! simulator and kill switch. Only the loaded feed is shared, read-only.

use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use tradeguard_core::data::MarketDataFeed;
use tradeguard_core::engine::CancellationToken;
use tradeguard_core::BacktestResult;

use crate::config::RunConfig;
use crate::data_loader::load_feed;
use crate::runner::run_with_feed;

/// Values to try for each swept parameter. An empty list keeps the base
/// config's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    pub slippage_bps: Vec<f64>,
    pub commission_rates: Vec<f64>,
    pub position_sizes: Vec<f64>,
}

/// One combination of swept values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub slippage_bps: f64,
    pub commission_rate: f64,
    /// `None` when position size is not swept.
    pub position_size: Option<f64>,
}

impl ParamGrid {
    /// 0/5/10 bps slippage against 0/5/10 bps commission.
    pub fn cost_sensitivity() -> Self {
        Self {
            slippage_bps: vec![0.0, 5.0, 10.0],
            commission_rates: vec![0.0, 0.0005, 0.001],
            position_sizes: Vec::new(),
        }
    }

    /// Total number of configurations in this grid.
    pub fn size(&self) -> usize {
        self.slippage_bps.len().max(1)
            * self.commission_rates.len().max(1)
            * self.position_sizes.len().max(1)
    }

    /// All points, slippage outermost.
    pub fn points(&self, base: &RunConfig) -> Vec<SweepPoint> {
        let slippage = or_base(&self.slippage_bps, base.costs.slippage_bps);
        let commission = or_base(&self.commission_rates, base.costs.commission_rate);
        let sizes: Vec<Option<f64>> = if self.position_sizes.is_empty() {
            vec![None]
        } else {
            self.position_sizes.iter().copied().map(Some).collect()
        };

        let mut points = Vec::with_capacity(self.size());
        for &slippage_bps in &slippage {
            for &commission_rate in &commission {
                for &position_size in &sizes {
                    points.push(SweepPoint {
                        slippage_bps,
                        commission_rate,
                        position_size,
                    });
                }
            }
        }
        points
    }

    /// The base config rewritten for each point.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<(SweepPoint, RunConfig)> {
        self.points(base)
            .into_iter()
            .map(|point| {
                let mut config = base.clone();
                config.costs.slippage_bps = point.slippage_bps;
                config.costs.commission_rate = point.commission_rate;
                if let Some(size) = point.position_size {
                    config.strategy.set_position_size(size);
                }
                (point, config)
            })
            .collect()
    }
}

fn or_base(values: &[f64], base: f64) -> Vec<f64> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

/// Parameter sweep executor.
///
/// Runs every configuration in a grid, in parallel by default.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Load the base config's data once, then run every grid point.
    pub fn sweep(&self, grid: &ParamGrid, base: &RunConfig) -> Result<SweepResults> {
        let loaded = load_feed(base).context("failed to load sweep data")?;
        self.sweep_with_feed(grid, base, Arc::new(loaded.feed))
    }

    /// Run every grid point against an already-loaded feed.
    pub fn sweep_with_feed(
        &self,
        grid: &ParamGrid,
        base: &RunConfig,
        feed: Arc<dyn MarketDataFeed>,
    ) -> Result<SweepResults> {
        let configs = grid.generate_configs(base);
        for (_, config) in &configs {
            config.validate()?;
        }
        info!(points = configs.len(), parallel = self.parallel, "sweep started");

        let run_one = |(point, config): &(SweepPoint, RunConfig)| -> Result<SweepEntry> {
            let result = run_with_feed(config, Arc::clone(&feed), CancellationToken::new())
                .with_context(|| format!("sweep point {point:?} failed"))?;
            Ok(SweepEntry {
                point: *point,
                run_id: result.run_id.clone().unwrap_or_default(),
                result,
            })
        };

        let entries = if self.parallel {
            configs.par_iter().map(run_one).collect::<Result<Vec<_>>>()?
        } else {
            configs.iter().map(run_one).collect::<Result<Vec<_>>>()?
        };

        Ok(SweepResults { entries })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub point: SweepPoint,
    pub run_id: String,
    pub result: BacktestResult,
}

/// Results in grid order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    pub entries: Vec<SweepEntry>,
}

impl SweepResults {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&SweepEntry> {
        self.entries.iter().find(|e| e.run_id == run_id)
    }

    /// Highest Sharpe; ties keep grid order.
    pub fn best_by_sharpe(&self) -> Option<&SweepEntry> {
        self.entries.iter().reduce(|best, e| {
            if e.result.sharpe_ratio > best.result.sharpe_ratio {
                e
            } else {
                best
            }
        })
    }

    /// Entries sorted by total return, best first.
    pub fn ranked_by_return(&self) -> Vec<&SweepEntry> {
        let mut ranked: Vec<&SweepEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| {
            b.result
                .total_return
                .partial_cmp(&a.result.total_return)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base() -> RunConfig {
        RunConfig::from_toml(
            r#"
[backtest]
tickers = ["SPY"]
start_date = "2024-01-02"
end_date = "2024-04-30"

[strategy]
type = "ma_crossover"
short_period = 3
long_period = 10
position_size = 0.2

[data]
source = "synthetic"
seed = 3
"#,
        )
        .unwrap()
    }

    #[test]
    fn grid_size_counts_unswept_dimensions_once() {
        let grid = ParamGrid {
            slippage_bps: vec![0.0, 5.0],
            commission_rates: vec![],
            position_sizes: vec![0.1, 0.2, 0.3],
        };
        assert_eq!(grid.size(), 6);
        assert_eq!(grid.points(&base()).len(), 6);
        assert_eq!(ParamGrid::default().size(), 1);
    }

    #[test]
    fn unswept_values_come_from_base() {
        let grid = ParamGrid {
            slippage_bps: vec![7.0],
            ..ParamGrid::default()
        };
        let configs = grid.generate_configs(&base());
        assert_eq!(configs.len(), 1);
        let (point, config) = &configs[0];
        assert_eq!(point.position_size, None);
        assert_eq!(config.costs.slippage_bps, 7.0);
        assert_eq!(config.costs.commission_rate, base().costs.commission_rate);
        assert_eq!(config.strategy, base().strategy);
    }

    #[test]
    fn configs_get_distinct_run_ids() {
        let configs = ParamGrid::cost_sensitivity().generate_configs(&base());
        let mut ids: Vec<String> = configs.iter().map(|(_, c)| c.run_id().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 9);
    }

    #[test]
    fn parallel_matches_sequential() {
        let grid = ParamGrid {
            slippage_bps: vec![0.0, 20.0],
            commission_rates: vec![0.0, 0.002],
            position_sizes: vec![],
        };
        let par = ParamSweep::new().sweep(&grid, &base()).unwrap();
        let seq = ParamSweep::new()
            .with_parallelism(false)
            .sweep(&grid, &base())
            .unwrap();
        assert_eq!(par.len(), 4);
        assert_eq!(par, seq);
    }

    #[test]
    fn invalid_point_fails_before_running() {
        let grid = ParamGrid {
            position_sizes: vec![1.5],
            ..ParamGrid::default()
        };
        assert!(ParamSweep::new().sweep(&grid, &base()).is_err());
    }

    proptest! {
        #[test]
        fn points_match_size(
            slippage in proptest::collection::vec(0.0f64..50.0, 0..4),
            commission in proptest::collection::vec(0.0f64..0.01, 0..4),
            sizes in proptest::collection::vec(0.01f64..1.0, 0..4),
        ) {
            let grid = ParamGrid {
                slippage_bps: slippage,
                commission_rates: commission,
                position_sizes: sizes,
            };
            prop_assert_eq!(grid.points(&base()).len(), grid.size());
        }
    }
}
