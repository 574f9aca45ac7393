//! PerformanceAnalyzer: statistics derived from the equity curve and the
//! closed-trade list.
//!
//! Conventions:
//! - Returns are simple per-step returns of consecutive equity snapshots.
//! - Standard deviation is the sample form (n − 1); no risk-free rate.
//! - Annualization multiplies by `sqrt(periods_per_year)`.
//! - `max_drawdown` is a positive fraction of the running peak.
//! - Win rate and profit factor use gross realized PnL.

use serde::{Deserialize, Serialize};

use crate::domain::ClosedTrade;
use crate::ledger::EquityPoint;

/// Profit factor reported when there are winners but no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Annualized standard deviation of step returns.
    pub volatility: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub closed_trades: usize,
    pub winning_trades: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceAnalyzer {
    periods_per_year: f64,
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new(252.0)
    }
}

impl PerformanceAnalyzer {
    pub fn new(periods_per_year: f64) -> Self {
        Self { periods_per_year }
    }

    pub fn periods_per_year(&self) -> f64 {
        self.periods_per_year
    }

    pub fn analyze(&self, curve: &[EquityPoint], trades: &[ClosedTrade]) -> PerformanceReport {
        let equity: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        let returns = step_returns(&equity);
        PerformanceReport {
            total_return: total_return(&equity),
            sharpe_ratio: sharpe_ratio(&returns, self.periods_per_year),
            sortino_ratio: sortino_ratio(&returns, self.periods_per_year),
            max_drawdown: max_drawdown(&equity),
            volatility: std_dev(&returns) * self.periods_per_year.sqrt(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            closed_trades: trades.len(),
            winning_trades: trades.iter().filter(|t| t.is_winner()).count(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// `equity[last] / equity[first] − 1`; 0 for fewer than two points or a
/// non-positive start.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if equity.len() >= 2 && first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Simple returns between consecutive points. A non-positive base yields 0
/// for that step.
pub fn step_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// `mean(r) / std(r) × sqrt(periods_per_year)`. 0 when variance is zero or
/// there are fewer than two returns.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std * periods_per_year.sqrt()
}

/// Like Sharpe, with downside deviation over all periods in the denominator.
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / downside_std * periods_per_year.sqrt()
}

/// Largest peak-to-trough decline as a positive fraction of the peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Fraction of closed trades with realized PnL > 0.
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl > 0.0)
        .map(|t| t.realized_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl < 0.0)
        .map(|t| t.realized_pnl.abs())
        .sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
