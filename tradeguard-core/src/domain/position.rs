use serde::{Deserialize, Serialize};

/// Open position in one ticker. Mutated only by fills; removed from the
/// ledger when `shares` reaches zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub shares: i64,
    pub avg_cost: f64,
    pub realized_pnl: f64,
    /// Protective stop carried over from the opening decision.
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

impl Position {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            shares: 0,
            avg_cost: 0.0,
            realized_pnl: 0.0,
            stop_loss: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.shares == 0
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.shares as f64 * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.shares as f64 * (current_price - self.avg_cost)
    }

    /// Weighted-average cost update for an added lot.
    ///
    /// Returns the new share count, or `None` (position unchanged) when the
    /// lot does not fit in the signed share count.
    pub fn add(&mut self, shares: u64, price: f64) -> Option<i64> {
        let added = i64::try_from(shares).ok()?;
        let total = self.shares.checked_add(added)?;
        self.avg_cost =
            (self.avg_cost * self.shares as f64 + price * shares as f64) / total as f64;
        self.shares = total;
        Some(total)
    }

    /// Reduce by `shares` at `price`, returning the realized PnL of the lot.
    ///
    /// `None` (position unchanged) when more shares are requested than held.
    pub fn reduce(&mut self, shares: u64, price: f64) -> Option<f64> {
        let held = u64::try_from(self.shares).ok()?;
        if shares > held {
            return None;
        }
        let removed = i64::try_from(shares).ok()?;
        let pnl = (price - self.avg_cost) * shares as f64;
        self.realized_pnl += pnl;
        self.shares -= removed;
        Some(pnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_averages_cost() {
        let mut pos = Position::new("SPY");
        assert_eq!(pos.add(100, 100.0), Some(100));
        assert_eq!(pos.add(100, 110.0), Some(200));
        assert_eq!(pos.shares, 200);
        assert!((pos.avg_cost - 105.0).abs() < 1e-12);
    }

    #[test]
    fn reduce_realizes_against_avg_cost() {
        let mut pos = Position::new("SPY");
        pos.add(100, 100.0);
        let pnl = pos.reduce(40, 110.0).unwrap();
        assert!((pnl - 400.0).abs() < 1e-12);
        assert_eq!(pos.shares, 60);
        assert!((pos.avg_cost - 100.0).abs() < 1e-12);
        assert!((pos.realized_pnl - 400.0).abs() < 1e-12);
    }

    #[test]
    fn unrealized_and_market_value() {
        let mut pos = Position::new("SPY");
        pos.add(10, 100.0);
        assert_eq!(pos.market_value(110.0), 1100.0);
        assert_eq!(pos.unrealized_pnl(110.0), 100.0);
    }

    #[test]
    fn oversized_lots_leave_position_unchanged() {
        let mut pos = Position::new("SPY");
        pos.add(100, 100.0);
        assert_eq!(pos.reduce(101, 100.0), None);
        assert_eq!(pos.reduce(u64::MAX, 100.0), None);
        assert_eq!(pos.add(u64::MAX, 100.0), None);
        assert_eq!(pos.add(i64::MAX as u64, 100.0), None);
        assert_eq!(pos.shares, 100);
        assert!((pos.avg_cost - 100.0).abs() < 1e-12);
        assert_eq!(pos.realized_pnl, 0.0);
    }
}
