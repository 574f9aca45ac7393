//! Engine configuration and construction-time validation.
//!
//! All thresholds are validated once, when an engine, simulator or risk
//! component is built. A bad threshold is fatal there and never surfaces
//! mid-run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::GatingPolicy;
use crate::risk::{KillSwitchConfig, WatchdogConfig};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("run range is empty: start {start} is after end {end}")]
    EmptyRange { start: String, end: String },

    #[error("no tickers to run")]
    EmptyUniverse,
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Require `value > 0` and finite.
pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be > 0")))
    }
}

/// Require `0 <= value` and finite.
pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be >= 0")))
    }
}

/// Execution friction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Adverse price adjustment in basis points.
    pub slippage_bps: f64,
    /// Commission as a fraction of traded notional.
    pub commission_rate: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 5.0,
            commission_rate: 0.0005,
        }
    }
}

impl CostConfig {
    pub fn frictionless() -> Self {
        Self {
            slippage_bps: 0.0,
            commission_rate: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("slippage_bps", self.slippage_bps)?;
        non_negative("commission_rate", self.commission_rate)?;
        if self.commission_rate >= 1.0 {
            return Err(ConfigError::invalid(
                "commission_rate",
                format!("{} must be < 1", self.commission_rate),
            ));
        }
        Ok(())
    }
}

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub max_positions: usize,
    pub costs: CostConfig,
    pub kill_switch: KillSwitchConfig,
    pub watchdog: WatchdogConfig,
    /// What to do with data observable after the simulated "now".
    pub gating: GatingPolicy,
    /// Spacing of simulated steps.
    pub bar_interval_secs: i64,
    /// Annualization factor for Sharpe/Sortino/volatility.
    pub periods_per_year: f64,
    /// Soft per-fetch deadline; slower fetches count as unavailable data.
    pub fetch_timeout_ms: u64,
    /// Trailing window for the order-flow figure handed to strategies.
    pub flow_window_secs: i64,
    /// Clear the watchdog's error budget at each new simulated day.
    pub watchdog_reset_daily: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            max_positions: 10,
            costs: CostConfig::default(),
            kill_switch: KillSwitchConfig::default(),
            watchdog: WatchdogConfig::default(),
            gating: GatingPolicy::Strict,
            bar_interval_secs: 86_400,
            periods_per_year: 252.0,
            fetch_timeout_ms: 5_000,
            flow_window_secs: 5 * 86_400,
            watchdog_reset_daily: true,
        }
    }
}

impl EngineConfig {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            ..Self::default()
        }
    }

    pub fn with_costs(mut self, slippage_bps: f64, commission_rate: f64) -> Self {
        self.costs = CostConfig {
            slippage_bps,
            commission_rate,
        };
        self
    }

    pub fn with_gating(mut self, gating: GatingPolicy) -> Self {
        self.gating = gating;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("initial_capital", self.initial_capital)?;
        if self.max_positions == 0 {
            return Err(ConfigError::invalid("max_positions", "must be >= 1"));
        }
        self.costs.validate()?;
        self.kill_switch.validate()?;
        self.watchdog.validate()?;
        if self.bar_interval_secs <= 0 {
            return Err(ConfigError::invalid(
                "bar_interval_secs",
                format!("{} must be > 0", self.bar_interval_secs),
            ));
        }
        positive("periods_per_year", self.periods_per_year)?;
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::invalid("fetch_timeout_ms", "must be > 0"));
        }
        if self.flow_window_secs <= 0 {
            return Err(ConfigError::invalid(
                "flow_window_secs",
                format!("{} must be > 0", self.flow_window_secs),
            ));
        }
        Ok(())
    }
}
