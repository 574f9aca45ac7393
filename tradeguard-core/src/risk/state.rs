//! TradingState: the figures the kill switch evaluates.
//!
//! Every field is optional so that a partially-populated state (e.g. loaded
//! from JSON, or built while equity is non-positive) can be represented. The
//! kill switch treats a missing field as a breach.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingState {
    /// Today's PnL as a percent of day-start equity (negative = loss).
    pub daily_loss_pct: Option<f64>,
    /// Current equity vs. peak, in percent (zero or negative).
    pub drawdown_pct: Option<f64>,
    pub api_error_count: Option<u32>,
    /// Largest position value / equity, as a fraction.
    pub position_concentration: Option<f64>,
    pub stale_data_age_minutes: Option<f64>,
    pub daily_trade_count: Option<u32>,
}

/// Raw account figures from which a [`TradingState`] is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccountFigures {
    pub daily_pnl: f64,
    pub day_start_equity: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub largest_position_value: f64,
    pub api_error_count: u32,
    pub stale_data_age_minutes: f64,
    pub daily_trade_count: u32,
}

impl TradingState {
    /// Ratios with a non-positive denominator are left as `None`.
    pub fn from_account(fig: &AccountFigures) -> Self {
        let ratio = |num: f64, den: f64| {
            if den > 0.0 && den.is_finite() && num.is_finite() {
                Some(num / den)
            } else {
                None
            }
        };
        Self {
            daily_loss_pct: ratio(fig.daily_pnl, fig.day_start_equity).map(|r| r * 100.0),
            drawdown_pct: ratio(fig.equity - fig.peak_equity, fig.peak_equity).map(|r| r * 100.0),
            api_error_count: Some(fig.api_error_count),
            position_concentration: ratio(fig.largest_position_value, fig.equity),
            stale_data_age_minutes: Some(fig.stale_data_age_minutes),
            daily_trade_count: Some(fig.daily_trade_count),
        }
    }

    /// A fully-populated state with nothing at risk.
    pub fn calm() -> Self {
        Self {
            daily_loss_pct: Some(0.0),
            drawdown_pct: Some(0.0),
            api_error_count: Some(0),
            position_concentration: Some(0.0),
            stale_data_age_minutes: Some(0.0),
            daily_trade_count: Some(0),
        }
    }
}
