//! ClosedTrade: the realized outcome of a sell against the average cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderId;

/// One sell fill matched against the position's weighted-average cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub order_id: OrderId,
    pub ticker: String,
    pub quantity: u64,
    pub avg_cost: f64,
    pub exit_price: f64,
    /// (exit_price - avg_cost) × quantity, gross of commission.
    pub realized_pnl: f64,
    pub commission: f64,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }

    pub fn net_pnl(&self) -> f64 {
        self.realized_pnl - self.commission
    }

    /// Return on the lot as a fraction of its cost basis.
    pub fn return_pct(&self) -> f64 {
        if self.avg_cost == 0.0 || self.quantity == 0 {
            return 0.0;
        }
        self.realized_pnl / (self.avg_cost * self.quantity as f64)
    }
}
