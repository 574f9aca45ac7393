use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::summary::{EquityPoint, PortfolioSummary};
use crate::domain::{ClosedTrade, Fill, Order, OrderId, OrderSide, Position};

/// Cash comparisons tolerate this much rounding.
const CASH_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient funds: need {required:.2}, have {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient shares of {ticker}: want {requested}, hold {held}")]
    InsufficientShares {
        ticker: String,
        requested: u64,
        held: i64,
    },

    #[error("order {0} is not pending")]
    UnknownOrder(OrderId),

    #[error("invalid fill: {0}")]
    InvalidFill(String),
}

#[derive(Debug, Clone, Copy)]
struct PriceMark {
    price: f64,
    at: DateTime<Utc>,
}

/// Cash, positions and history for one run. Exactly one writer.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    initial_capital: f64,
    cash: f64,
    positions: BTreeMap<String, Position>,
    last_prices: BTreeMap<String, PriceMark>,
    pending: BTreeMap<OrderId, Order>,
    next_order_id: u64,
    equity_curve: Vec<EquityPoint>,
    trade_log: Vec<Fill>,
    closed_trades: Vec<ClosedTrade>,
    total_commission: f64,
    realized_pnl: f64,
}

impl PortfolioLedger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            pending: BTreeMap::new(),
            next_order_id: 1,
            equity_curve: Vec::new(),
            trade_log: Vec::new(),
            closed_trades: Vec::new(),
            total_commission: 0.0,
            realized_pnl: 0.0,
        }
    }

    // ── Orders ──────────────────────────────────────────────────────

    /// Register a pending order. It must be resolved with [`fill_order`]
    /// before the step ends.
    ///
    /// [`fill_order`]: PortfolioLedger::fill_order
    pub fn create_order(
        &mut self,
        ticker: &str,
        side: OrderSide,
        quantity: u64,
        requested_price: f64,
        created_at: DateTime<Utc>,
    ) -> Order {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let order = Order {
            id,
            ticker: ticker.to_string(),
            side,
            quantity,
            requested_price,
            created_at,
        };
        self.pending.insert(id, order.clone());
        order
    }

    /// Resolve a pending order as filled.
    ///
    /// The order leaves the pending set whether or not the fill is accepted;
    /// on error nothing else changes.
    pub fn fill_order(
        &mut self,
        order: &Order,
        executed_price: f64,
        commission: f64,
        at: DateTime<Utc>,
    ) -> Result<Fill, LedgerError> {
        let order = self
            .pending
            .remove(&order.id)
            .ok_or(LedgerError::UnknownOrder(order.id))?;

        if order.quantity == 0 {
            return Err(LedgerError::InvalidFill("quantity must be > 0".into()));
        }
        if !(executed_price.is_finite() && executed_price > 0.0) {
            return Err(LedgerError::InvalidFill(format!(
                "executed price {executed_price} must be finite and > 0"
            )));
        }
        if !(commission.is_finite() && commission >= 0.0) {
            return Err(LedgerError::InvalidFill(format!(
                "commission {commission} must be finite and >= 0"
            )));
        }

        match order.side {
            OrderSide::Buy => {
                let required = executed_price * order.quantity as f64 + commission;
                if required > self.cash + CASH_EPSILON {
                    return Err(LedgerError::InsufficientFunds {
                        required,
                        available: self.cash,
                    });
                }
            }
            OrderSide::Sell => {
                let held = self.positions.get(&order.ticker).map_or(0, |p| p.shares);
                if u64::try_from(held).map_or(true, |h| order.quantity > h) {
                    return Err(LedgerError::InsufficientShares {
                        ticker: order.ticker.clone(),
                        requested: order.quantity,
                        held,
                    });
                }
            }
        }

        let fill = Fill {
            order_id: order.id,
            ticker: order.ticker.clone(),
            side: order.side,
            executed_price,
            quantity: order.quantity,
            commission,
            timestamp: at,
        };

        let closed = self.update_position(&fill)?;
        self.cash += fill.cash_delta();
        self.total_commission += commission;
        if let Some(closed) = closed {
            self.realized_pnl += closed.realized_pnl;
            self.closed_trades.push(closed);
        }
        if !self.last_prices.contains_key(&order.ticker) && order.requested_price > 0.0 {
            self.mark(&order.ticker, order.requested_price, at);
        }
        self.trade_log.push(fill.clone());
        Ok(fill)
    }

    /// Number of orders awaiting resolution.
    pub fn pending_orders(&self) -> usize {
        self.pending.len()
    }

    pub fn orders_created(&self) -> u64 {
        self.next_order_id - 1
    }

    /// Apply a validated fill to its position. A sell yields the realized
    /// closed trade; the position is removed when it reaches zero shares.
    /// On error the position is left as it was.
    fn update_position(&mut self, fill: &Fill) -> Result<Option<ClosedTrade>, LedgerError> {
        match fill.side {
            OrderSide::Buy => {
                let pos = self
                    .positions
                    .entry(fill.ticker.clone())
                    .or_insert_with(|| Position::new(&fill.ticker));
                if pos.add(fill.quantity, fill.executed_price).is_none() {
                    if pos.is_flat() {
                        self.positions.remove(&fill.ticker);
                    }
                    return Err(LedgerError::InvalidFill(format!(
                        "{} shares overflow the {} position",
                        fill.quantity, fill.ticker
                    )));
                }
                Ok(None)
            }
            OrderSide::Sell => {
                let pos = self.positions.get_mut(&fill.ticker).ok_or_else(|| {
                    LedgerError::InsufficientShares {
                        ticker: fill.ticker.clone(),
                        requested: fill.quantity,
                        held: 0,
                    }
                })?;
                let avg_cost = pos.avg_cost;
                let held = pos.shares;
                let pnl = pos.reduce(fill.quantity, fill.executed_price).ok_or_else(|| {
                    LedgerError::InsufficientShares {
                        ticker: fill.ticker.clone(),
                        requested: fill.quantity,
                        held,
                    }
                })?;
                if pos.is_flat() {
                    self.positions.remove(&fill.ticker);
                }
                Ok(Some(ClosedTrade {
                    order_id: fill.order_id,
                    ticker: fill.ticker.clone(),
                    quantity: fill.quantity,
                    avg_cost,
                    exit_price: fill.executed_price,
                    realized_pnl: pnl,
                    commission: fill.commission,
                    closed_at: fill.timestamp,
                }))
            }
        }
    }

    // ── Positions ───────────────────────────────────────────────────

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    /// Attach a protective stop to an open position.
    pub fn set_stop_loss(&mut self, ticker: &str, stop: f64) -> bool {
        match self.positions.get_mut(ticker) {
            Some(pos) => {
                pos.stop_loss = Some(stop);
                true
            }
            None => false,
        }
    }

    // ── Marks and equity ────────────────────────────────────────────

    /// Record the latest observed price. Non-finite or non-positive prices
    /// are ignored.
    pub fn mark(&mut self, ticker: &str, price: f64, at: DateTime<Utc>) {
        if price.is_finite() && price > 0.0 {
            self.last_prices
                .insert(ticker.to_string(), PriceMark { price, at });
        }
    }

    pub fn last_price(&self, ticker: &str) -> Option<f64> {
        self.last_prices.get(ticker).map(|m| m.price)
    }

    fn valuation_price(&self, pos: &Position) -> f64 {
        self.last_price(&pos.ticker).unwrap_or(pos.avg_cost)
    }

    /// `cash + Σ shares × last_price`, falling back to average cost for
    /// positions never marked.
    pub fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|p| p.market_value(self.valuation_price(p)))
                .sum::<f64>()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions
            .values()
            .map(|p| p.unrealized_pnl(self.valuation_price(p)))
            .sum()
    }

    pub fn largest_position_value(&self) -> f64 {
        self.positions
            .values()
            .map(|p| p.market_value(self.valuation_price(p)).abs())
            .fold(0.0, f64::max)
    }

    /// Minutes since the oldest mark among held positions; 0 when flat.
    pub fn stalest_mark_minutes(&self, now: DateTime<Utc>) -> f64 {
        self.positions
            .keys()
            .filter_map(|t| self.last_prices.get(t))
            .map(|m| (now - m.at).num_seconds().max(0) as f64 / 60.0)
            .fold(0.0, f64::max)
    }

    /// Append an equity snapshot.
    pub fn snapshot(&mut self, at: DateTime<Utc>) -> EquityPoint {
        let point = EquityPoint {
            timestamp: at,
            equity: self.equity(),
        };
        self.equity_curve.push(point);
        point
    }

    // ── Read access ─────────────────────────────────────────────────

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn trade_log(&self) -> &[Fill] {
        &self.trade_log
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn get_summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            initial_capital: self.initial_capital,
            cash: self.cash,
            open_positions: self.positions.len(),
            equity: self.equity(),
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            total_commission: self.total_commission,
            trade_count: self.trade_log.len(),
            closed_trade_count: self.closed_trades.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap()
    }

    fn fill(
        ledger: &mut PortfolioLedger,
        side: OrderSide,
        qty: u64,
        price: f64,
        commission: f64,
    ) -> Result<Fill, LedgerError> {
        let order = ledger.create_order("SPY", side, qty, price, t0());
        ledger.fill_order(&order, price, commission, t0())
    }

    #[test]
    fn buy_moves_cash_into_position() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 100, 100.0, 5.0).unwrap();
        assert_eq!(ledger.cash(), 100_000.0 - 10_000.0 - 5.0);
        assert_eq!(ledger.position("SPY").unwrap().shares, 100);
        assert!((ledger.equity() - (100_000.0 - 5.0)).abs() < 1e-9);
    }

    #[test]
    fn sell_realizes_and_removes_flat_position() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 100, 100.0, 0.0).unwrap();
        fill(&mut ledger, OrderSide::Sell, 100, 110.0, 0.0).unwrap();
        assert!(ledger.position("SPY").is_none());
        assert_eq!(ledger.realized_pnl(), 1_000.0);
        assert_eq!(ledger.cash(), 101_000.0);
        let closed = &ledger.closed_trades()[0];
        assert!(closed.is_winner());
        assert_eq!(closed.avg_cost, 100.0);
    }

    #[test]
    fn weighted_average_cost_across_buys() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 100, 100.0, 0.0).unwrap();
        fill(&mut ledger, OrderSide::Buy, 300, 120.0, 0.0).unwrap();
        let pos = ledger.position("SPY").unwrap();
        assert!((pos.avg_cost - 115.0).abs() < 1e-10);
    }

    #[test]
    fn rejects_overspend_without_side_effects() {
        let mut ledger = PortfolioLedger::new(1_000.0);
        let err = fill(&mut ledger, OrderSide::Buy, 10, 100.0, 0.01).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.cash(), 1_000.0);
        assert!(ledger.trade_log().is_empty());
        assert_eq!(ledger.pending_orders(), 0);
    }

    #[test]
    fn exact_cash_is_enough() {
        let mut ledger = PortfolioLedger::new(1_000.0);
        assert!(fill(&mut ledger, OrderSide::Buy, 10, 100.0, 0.0).is_ok());
        assert_eq!(ledger.cash(), 0.0);
    }

    #[test]
    fn rejects_oversell() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 10, 100.0, 0.0).unwrap();
        let err = fill(&mut ledger, OrderSide::Sell, 11, 100.0, 0.0).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientShares {
                ticker: "SPY".into(),
                requested: 11,
                held: 10
            }
        );
    }

    #[test]
    fn rejects_sell_beyond_signed_share_range() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 100, 100.0, 0.0).unwrap();
        let err = fill(&mut ledger, OrderSide::Sell, u64::MAX, 100.0, 0.0).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientShares {
                ticker: "SPY".into(),
                requested: u64::MAX,
                held: 100
            }
        );
        assert_eq!(ledger.cash(), 90_000.0);
        assert_eq!(ledger.position("SPY").unwrap().shares, 100);
        assert_eq!(ledger.trade_log().len(), 1);
        assert!(ledger.closed_trades().is_empty());
    }

    #[test]
    fn overflowing_buy_is_refused_without_side_effects() {
        let mut ledger = PortfolioLedger::new(f64::MAX);
        fill(&mut ledger, OrderSide::Buy, 10, 1e-6, 0.0).unwrap();
        let cash = ledger.cash();
        let err = fill(&mut ledger, OrderSide::Buy, i64::MAX as u64, 1e-6, 0.0).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidFill(_)));
        assert_eq!(ledger.cash(), cash);
        assert_eq!(ledger.position("SPY").unwrap().shares, 10);
        assert_eq!(ledger.trade_log().len(), 1);
    }

    #[test]
    fn order_fills_at_most_once() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        let order = ledger.create_order("SPY", OrderSide::Buy, 1, 10.0, t0());
        ledger.fill_order(&order, 10.0, 0.0, t0()).unwrap();
        assert_eq!(
            ledger.fill_order(&order, 10.0, 0.0, t0()),
            Err(LedgerError::UnknownOrder(order.id))
        );
    }

    #[test]
    fn invalid_fill_values_rejected() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        assert!(matches!(
            fill(&mut ledger, OrderSide::Buy, 1, f64::NAN, 0.0),
            Err(LedgerError::InvalidFill(_))
        ));
        assert!(matches!(
            fill(&mut ledger, OrderSide::Buy, 1, 10.0, -1.0),
            Err(LedgerError::InvalidFill(_))
        ));
        assert!(matches!(
            fill(&mut ledger, OrderSide::Buy, 0, 10.0, 0.0),
            Err(LedgerError::InvalidFill(_))
        ));
    }

    #[test]
    fn marks_drive_equity() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 100, 100.0, 0.0).unwrap();
        ledger.mark("SPY", 110.0, t0());
        assert_eq!(ledger.equity(), 101_000.0);
        assert_eq!(ledger.unrealized_pnl(), 1_000.0);
        assert_eq!(ledger.largest_position_value(), 11_000.0);
        ledger.mark("SPY", f64::NAN, t0());
        assert_eq!(ledger.last_price("SPY"), Some(110.0));
    }

    #[test]
    fn summary_conservation_identity() {
        let mut ledger = PortfolioLedger::new(50_000.0);
        fill(&mut ledger, OrderSide::Buy, 100, 100.0, 3.0).unwrap();
        fill(&mut ledger, OrderSide::Sell, 40, 95.0, 1.5).unwrap();
        ledger.mark("SPY", 102.0, t0());
        let s = ledger.get_summary();
        let rebuilt = s.initial_capital + s.realized_pnl + s.unrealized_pnl - s.total_commission;
        assert!((s.equity - rebuilt).abs() < 1e-9);
        assert_eq!(s.trade_count, 2);
        assert_eq!(s.closed_trade_count, 1);
        assert_eq!(s.open_positions, 1);
    }

    #[test]
    fn stale_marks_measured_from_held_positions_only() {
        let mut ledger = PortfolioLedger::new(100_000.0);
        fill(&mut ledger, OrderSide::Buy, 1, 100.0, 0.0).unwrap();
        ledger.mark("QQQ", 50.0, t0() - Duration::days(30));
        assert_eq!(ledger.stalest_mark_minutes(t0() + Duration::hours(2)), 120.0);
    }

    #[test]
    fn snapshots_append_in_order() {
        let mut ledger = PortfolioLedger::new(10_000.0);
        ledger.snapshot(t0());
        ledger.snapshot(t0() + Duration::days(1));
        let curve = ledger.equity_curve();
        assert_eq!(curve.len(), 2);
        assert!(curve[0].timestamp < curve[1].timestamp);
    }
}
