use crate::domain::order::{OrderId, OrderSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fill record. Immutable once appended to the trade log.
///
/// Invariant: `quantity > 0` and `commission >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub ticker: String,
    pub side: OrderSide,
    pub executed_price: f64,
    pub quantity: u64,
    pub commission: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// executed_price × quantity
    pub fn gross_amount(&self) -> f64 {
        self.executed_price * self.quantity as f64
    }

    /// Cash impact: negative for buys (cost + commission), positive for sells
    /// (proceeds - commission).
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            OrderSide::Buy => -(self.gross_amount() + self.commission),
            OrderSide::Sell => self.gross_amount() - self.commission,
        }
    }
}
