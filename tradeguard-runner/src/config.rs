//! TOML run configuration.
//!
//! One file describes a complete, reproducible run:
//!
//! ```toml
//! [backtest]
//! tickers = ["SPY", "QQQ"]
//! start_date = "2024-01-02"
//! end_date = "2024-12-31"
//! initial_capital = 100000.0
//!
//! [costs]
//! slippage_bps = 5.0
//! commission_rate = 0.0005
//!
//! [kill_switch]
//! max_daily_loss_pct = 5.0
//!
//! [strategy]
//! type = "ma_crossover"
//! short_period = 10
//! long_period = 50
//!
//! [data]
//! source = "csv"
//! dir = "data"
//! ```
//!
//! `[costs]`, `[kill_switch]` and `[watchdog]` may be omitted entirely.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use tradeguard_core::data::GatingPolicy;
use tradeguard_core::domain::Action;
use tradeguard_core::risk::{KillSwitchConfig, WatchdogConfig};
use tradeguard_core::{CostConfig, EngineConfig};

/// Environment variable consulted when `[kill_switch]` carries no
/// `override_code`.
pub const OVERRIDE_CODE_ENV: &str = "TRADEGUARD_OVERRIDE_CODE";

/// Unique identifier for a run (content-addressable hash of its config).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Engine(#[from] tradeguard_core::ConfigError),

    #[error("failed to fingerprint config: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub costs: CostConfig,
    #[serde(default)]
    pub kill_switch: KillSwitchConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    pub strategy: StrategyConfig,
    pub data: DataConfig,
}

/// `[backtest]`: range, universe and engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSection {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default)]
    pub gating: GatingPolicy,
    #[serde(default = "default_bar_interval_secs")]
    pub bar_interval_secs: i64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_flow_window_secs")]
    pub flow_window_secs: i64,
    #[serde(default = "default_watchdog_reset_daily")]
    pub watchdog_reset_daily: bool,
}

fn default_initial_capital() -> f64 {
    EngineConfig::default().initial_capital
}

fn default_max_positions() -> usize {
    EngineConfig::default().max_positions
}

fn default_bar_interval_secs() -> i64 {
    EngineConfig::default().bar_interval_secs
}

fn default_periods_per_year() -> f64 {
    EngineConfig::default().periods_per_year
}

fn default_fetch_timeout_ms() -> u64 {
    EngineConfig::default().fetch_timeout_ms
}

fn default_flow_window_secs() -> i64 {
    EngineConfig::default().flow_window_secs
}

fn default_watchdog_reset_daily() -> bool {
    EngineConfig::default().watchdog_reset_daily
}

fn default_position_size() -> f64 {
    0.1
}

/// `[strategy]`: which preset drives the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Buy once on the first visible bar, then hold.
    BuyAndHold {
        #[serde(default = "default_position_size")]
        position_size: f64,
    },

    /// Long while the short SMA is above the long SMA, flat otherwise.
    MaCrossover {
        short_period: usize,
        long_period: usize,
        #[serde(default = "default_position_size")]
        position_size: f64,
        /// Optional protective stop, as a fraction below the entry close.
        #[serde(default)]
        stop_loss_pct: Option<f64>,
    },

    /// Fixed orders on fixed dates.
    Scheduled {
        #[serde(default)]
        orders: Vec<ScheduledOrder>,
    },
}

/// One `[[strategy.orders]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOrder {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: Action,
    #[serde(default = "default_position_size")]
    pub position_size: f64,
    /// Exact share count; overrides `position_size`.
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::BuyAndHold { .. } => "buy_and_hold",
            StrategyConfig::MaCrossover { .. } => "ma_crossover",
            StrategyConfig::Scheduled { .. } => "scheduled",
        }
    }

    /// Replace the sizing fraction. Scheduled orders with an explicit
    /// quantity keep it.
    pub fn set_position_size(&mut self, size: f64) {
        match self {
            StrategyConfig::BuyAndHold { position_size }
            | StrategyConfig::MaCrossover { position_size, .. } => *position_size = size,
            StrategyConfig::Scheduled { orders } => {
                for order in orders.iter_mut().filter(|o| o.quantity.is_none()) {
                    order.position_size = size;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::BuyAndHold { position_size } => check_fraction(*position_size),
            StrategyConfig::MaCrossover {
                short_period,
                long_period,
                position_size,
                stop_loss_pct,
            } => {
                if *short_period == 0 || short_period >= long_period {
                    return Err(ConfigError::Invalid(format!(
                        "ma_crossover needs 0 < short_period < long_period, got {short_period}/{long_period}"
                    )));
                }
                if let Some(stop) = stop_loss_pct {
                    if !(stop.is_finite() && *stop > 0.0 && *stop < 1.0) {
                        return Err(ConfigError::Invalid(format!(
                            "stop_loss_pct {stop} must be in (0, 1)"
                        )));
                    }
                }
                check_fraction(*position_size)
            }
            StrategyConfig::Scheduled { orders } => {
                for order in orders {
                    if order.quantity.is_none() {
                        check_fraction(order.position_size)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_fraction(size: f64) -> Result<(), ConfigError> {
    if size.is_finite() && size > 0.0 && size <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "position_size {size} must be in (0, 1]"
        )))
    }
}

/// `[data]`: where bars come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// `<dir>/<TICKER>.csv` bars plus optional `<dir>/<TICKER>.news.csv`.
    Csv { dir: PathBuf },
    /// Seeded random walk; for development only.
    Synthetic(SyntheticConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub start_price: f64,
    /// Mean per-bar return.
    pub drift: f64,
    /// Per-bar return standard deviation.
    pub volatility: f64,
    pub base_volume: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: 100.0,
            drift: 0.0003,
            volatility: 0.012,
            base_volume: 1_000_000.0,
        }
    }
}

impl RunConfig {
    /// Load from a TOML file. A relative CSV directory is resolved against
    /// the file's own directory, and a missing override code is taken from
    /// [`OVERRIDE_CODE_ENV`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let (DataConfig::Csv { dir }, Some(base)) = (&mut config.data, path.parent()) {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        config.resolve_override_code();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate. Does not consult the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fill the override code from the environment when the file has none.
    pub fn resolve_override_code(&mut self) {
        if self.kill_switch.override_code.is_some() {
            return;
        }
        match std::env::var(OVERRIDE_CODE_ENV) {
            Ok(code) => {
                self.kill_switch = self.kill_switch.clone().with_override_code(code);
            }
            Err(_) => {
                warn!(
                    env = OVERRIDE_CODE_ENV,
                    "no kill switch override code configured; a halt cannot be lifted"
                );
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backtest.tickers.is_empty() {
            return Err(tradeguard_core::ConfigError::EmptyUniverse.into());
        }
        if self.backtest.start_date > self.backtest.end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {} is after end_date {}",
                self.backtest.start_date, self.backtest.end_date
            )));
        }
        if let DataConfig::Synthetic(synth) = &self.data {
            if !(synth.start_price.is_finite() && synth.start_price > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "synthetic start_price {} must be positive",
                    synth.start_price
                )));
            }
            if !(synth.volatility.is_finite() && synth.volatility >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "synthetic volatility {} must be non-negative",
                    synth.volatility
                )));
            }
        }
        self.strategy.validate()?;
        self.engine_config().validate()?;
        Ok(())
    }

    /// The engine-level view of this config.
    pub fn engine_config(&self) -> EngineConfig {
        let b = &self.backtest;
        EngineConfig {
            initial_capital: b.initial_capital,
            max_positions: b.max_positions,
            costs: self.costs.clone(),
            kill_switch: self.kill_switch.clone(),
            watchdog: self.watchdog.clone(),
            gating: b.gating,
            bar_interval_secs: b.bar_interval_secs,
            periods_per_year: b.periods_per_year,
            fetch_timeout_ms: b.fetch_timeout_ms,
            flow_window_secs: b.flow_window_secs,
            watchdog_reset_daily: b.watchdog_reset_daily,
        }
    }

    /// Start of the simulated range (midnight UTC).
    pub fn start(&self) -> DateTime<Utc> {
        self.backtest.start_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// End of the simulated range (midnight UTC of `end_date`).
    pub fn end(&self) -> DateTime<Utc> {
        self.backtest.end_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Deterministic fingerprint of this config.
    ///
    /// Two runs with identical configs share a RunId. The override code is
    /// never serialized and so never part of it.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
