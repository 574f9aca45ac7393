use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One equity snapshot, recorded once per simulated step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Account overview.
///
/// `equity == initial_capital + realized_pnl + unrealized_pnl - total_commission`
/// holds within floating tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub initial_capital: f64,
    pub cash: f64,
    pub open_positions: usize,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_commission: f64,
    pub trade_count: usize,
    pub closed_trade_count: usize,
}
