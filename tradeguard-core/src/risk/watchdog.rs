//! ExecutionWatchdog: per-order anomaly detection.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{positive, ConfigError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Largest tolerated `(price - vwap) / vwap`, as a fraction.
    pub max_price_deviation: f64,
    /// Fill rate below which a late order is considered stuck.
    pub min_fill_rate_threshold: f64,
    /// Errors tolerated before every verdict turns unsafe.
    pub max_error_count: u32,
    /// Elapsed-time ratio after which the fill-rate check applies.
    pub elapsed_ratio_cutoff: f64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_price_deviation: 0.05,
            min_fill_rate_threshold: 0.5,
            max_error_count: 10,
            elapsed_ratio_cutoff: 0.9,
        }
    }
}

impl WatchdogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_price_deviation", self.max_price_deviation)?;
        unit_interval("min_fill_rate_threshold", self.min_fill_rate_threshold)?;
        unit_interval("elapsed_ratio_cutoff", self.elapsed_ratio_cutoff)?;
        if self.max_error_count == 0 {
            return Err(ConfigError::invalid("max_error_count", "must be >= 1"));
        }
        Ok(())
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} outside [0, 1]")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchdogReason {
    TooManyErrors,
    PriceDeviation,
    TimeFillMismatch,
}

impl fmt::Display for WatchdogReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchdogReason::TooManyErrors => "TOO_MANY_ERRORS",
            WatchdogReason::PriceDeviation => "PRICE_DEVIATION",
            WatchdogReason::TimeFillMismatch => "TIME_FILL_MISMATCH",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe(WatchdogReason),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogState {
    pub error_count: u32,
    pub last_trigger_reason: Option<WatchdogReason>,
}

#[derive(Debug, Clone)]
pub struct ExecutionWatchdog {
    config: WatchdogConfig,
    state: WatchdogState,
}

impl ExecutionWatchdog {
    pub fn new(config: WatchdogConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: WatchdogState::default(),
        })
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn error_count(&self) -> u32 {
        self.state.error_count
    }

    /// First matching rule wins: error budget, then price deviation against
    /// the arrival VWAP, then time/fill mismatch. A non-positive
    /// `arrival_vwap` means no benchmark and skips the deviation rule; a
    /// non-finite `current_price` is always a deviation.
    pub fn check(
        &mut self,
        current_price: f64,
        arrival_vwap: f64,
        elapsed_time_ratio: f64,
        fill_rate: f64,
    ) -> Verdict {
        let reason = self.first_breach(current_price, arrival_vwap, elapsed_time_ratio, fill_rate);
        match reason {
            Some(reason) => {
                warn!(
                    %reason,
                    current_price,
                    arrival_vwap,
                    elapsed_time_ratio,
                    fill_rate,
                    error_count = self.state.error_count,
                    "watchdog verdict unsafe"
                );
                self.state.last_trigger_reason = Some(reason);
                Verdict::Unsafe(reason)
            }
            None => Verdict::Safe,
        }
    }

    fn first_breach(
        &self,
        current_price: f64,
        arrival_vwap: f64,
        elapsed_time_ratio: f64,
        fill_rate: f64,
    ) -> Option<WatchdogReason> {
        if self.state.error_count >= self.config.max_error_count {
            return Some(WatchdogReason::TooManyErrors);
        }
        if !current_price.is_finite() {
            return Some(WatchdogReason::PriceDeviation);
        }
        if arrival_vwap > 0.0 {
            let deviation = (current_price - arrival_vwap) / arrival_vwap;
            if deviation > self.config.max_price_deviation {
                return Some(WatchdogReason::PriceDeviation);
            }
        }
        if elapsed_time_ratio > self.config.elapsed_ratio_cutoff
            && fill_rate < self.config.min_fill_rate_threshold
        {
            return Some(WatchdogReason::TimeFillMismatch);
        }
        None
    }

    pub fn report_error(&mut self) {
        self.state.error_count = self.state.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.state = WatchdogState::default();
    }
}
