//! BacktestResult: serializable outcome of one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Action, ClosedTrade, Fill};
use crate::ledger::EquityPoint;
use crate::risk::KillSwitchStatus;

/// An order that did not fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub action: Action,
    /// Short machine-readable kind, e.g. `INSUFFICIENT_FUNDS`.
    pub kind: String,
    pub message: String,
}

/// A per-ticker data failure that skipped the ticker for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Fingerprint assigned by the caller (the runner hashes its config).
    #[serde(default)]
    pub run_id: Option<String>,
    pub strategy: String,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Positive fraction of peak equity.
    pub max_drawdown: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Number of fills.
    pub total_trades: usize,
    pub total_commission: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<Fill>,
    pub closed_trades: Vec<ClosedTrade>,
    pub rejections: Vec<RejectionRecord>,
    pub data_errors: Vec<DataErrorRecord>,
    pub warnings: Vec<String>,
    pub steps: u64,
    pub kill_switch: KillSwitchStatus,
    pub cancelled: bool,
}

impl BacktestResult {
    /// Equity values only, in time order.
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }

    pub fn halted(&self) -> bool {
        self.kill_switch.is_halted()
    }
}
