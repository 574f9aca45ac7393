//! ExecutionSimulator: turns a Decision into a Fill or a Rejection.
//!
//! Order of checks per decision:
//! 1. HOLD short-circuits with no order.
//! 2. Kill switch (no order may be created while halted).
//! 3. Decision validation, reference price, sizing, position cap.
//! 4. Watchdog pre-trade verdict against the arrival VWAP.
//! 5. Kill switch again, immediately before the order is committed.
//! 6. Ledger commit (cash/share sufficiency is enforced there).

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Action, Bar, Decision, DecisionError, Fill, OrderSide};
use crate::execution::cost_model::{BpsCostModel, CostModel};
use crate::execution::vwap::ArrivalVwap;
use crate::ledger::{LedgerError, PortfolioLedger};
use crate::risk::{ExecutionWatchdog, KillSwitch, RiskError, Verdict, WatchdogReason};

/// Why an order was not filled. Always recoverable at the run level.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("trading halted: {reason}")]
    TradingHalted { reason: String },

    #[error("invalid decision: {0}")]
    InvalidDecision(#[from] DecisionError),

    #[error("invalid reference price {0}")]
    InvalidPrice(f64),

    #[error("order size rounds to zero shares")]
    ZeroQuantity,

    #[error("max positions ({max}) already open")]
    MaxPositionsReached { max: usize },

    #[error("watchdog verdict unsafe: {0}")]
    WatchdogUnsafe(WatchdogReason),

    #[error("insufficient funds: need {required:.2}, have {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient shares: want {requested}, hold {held}")]
    InsufficientShares { requested: u64, held: i64 },

    #[error("fill refused by ledger: {0}")]
    InvalidFill(String),
}

impl Rejection {
    /// Stable short name for logs and result records.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::TradingHalted { .. } => "TRADING_HALTED",
            Rejection::InvalidDecision(_) => "INVALID_DECISION",
            Rejection::InvalidPrice(_) => "INVALID_PRICE",
            Rejection::ZeroQuantity => "ZERO_QUANTITY",
            Rejection::MaxPositionsReached { .. } => "MAX_POSITIONS",
            Rejection::WatchdogUnsafe(_) => "WATCHDOG_UNSAFE",
            Rejection::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Rejection::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            Rejection::InvalidFill(_) => "INVALID_FILL",
        }
    }
}

impl From<RiskError> for Rejection {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::TradingHalted { reason } => Rejection::TradingHalted { reason },
            other => Rejection::TradingHalted {
                reason: other.to_string(),
            },
        }
    }
}

impl From<LedgerError> for Rejection {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                required,
                available,
            } => Rejection::InsufficientFunds {
                required,
                available,
            },
            LedgerError::InsufficientShares {
                requested, held, ..
            } => Rejection::InsufficientShares { requested, held },
            other => Rejection::InvalidFill(other.to_string()),
        }
    }
}

/// Market view at the moment a decision is executed.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot<'a> {
    pub timestamp: DateTime<Utc>,
    /// Reference price (last visible close).
    pub price: f64,
    /// The bar that produced `price`, used to seed the arrival VWAP.
    pub bar: Option<&'a Bar>,
}

impl<'a> MarketSnapshot<'a> {
    pub fn from_bar(bar: &'a Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            price: bar.close,
            bar: Some(bar),
        }
    }
}

#[derive(Debug)]
pub struct ExecutionSimulator {
    cost_model: Box<dyn CostModel>,
    watchdog: ExecutionWatchdog,
    vwap: ArrivalVwap,
    max_positions: usize,
}

impl ExecutionSimulator {
    pub fn new(
        cost_model: Box<dyn CostModel>,
        watchdog: ExecutionWatchdog,
        max_positions: usize,
    ) -> Self {
        Self {
            cost_model,
            watchdog,
            vwap: ArrivalVwap::new(),
            max_positions,
        }
    }

    /// Simulator with the bps cost model and the configured watchdog.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.costs.validate()?;
        let watchdog = ExecutionWatchdog::new(config.watchdog.clone())?;
        Ok(Self::new(
            Box::new(BpsCostModel::from_config(&config.costs)),
            watchdog,
            config.max_positions,
        ))
    }

    pub fn cost_model(&self) -> &dyn CostModel {
        self.cost_model.as_ref()
    }

    pub fn watchdog(&self) -> &ExecutionWatchdog {
        &self.watchdog
    }

    pub fn watchdog_mut(&mut self) -> &mut ExecutionWatchdog {
        &mut self.watchdog
    }

    /// Benchmark of the most recent parent order.
    pub fn arrival_vwap(&self) -> Option<f64> {
        self.vwap.get_vwap()
    }

    /// Shares for a decision: the explicit quantity if given, otherwise
    /// `floor(position_size_pct × equity / price)`.
    pub fn order_quantity(&self, decision: &Decision, price: f64, equity: f64) -> u64 {
        if let Some(q) = decision.quantity {
            return q;
        }
        let shares = (decision.position_size_pct * equity / price).floor();
        if shares.is_finite() && shares > 0.0 {
            shares as u64
        } else {
            0
        }
    }

    /// Execute one decision against the ledger.
    ///
    /// Returns `Ok(None)` for HOLD, `Ok(Some(fill))` when an order was filled.
    pub fn execute(
        &mut self,
        decision: &Decision,
        market: &MarketSnapshot<'_>,
        ledger: &mut PortfolioLedger,
        kill_switch: &KillSwitch,
    ) -> Result<Option<Fill>, Rejection> {
        let side = match decision.action {
            Action::Hold => return Ok(None),
            Action::Buy => OrderSide::Buy,
            Action::Sell => OrderSide::Sell,
        };

        kill_switch.ensure_can_trade()?;
        decision.validate()?;

        if !(market.price.is_finite() && market.price > 0.0) {
            return Err(Rejection::InvalidPrice(market.price));
        }

        let quantity = self.order_quantity(decision, market.price, ledger.equity());
        if quantity == 0 {
            return Err(Rejection::ZeroQuantity);
        }

        if side == OrderSide::Buy
            && ledger.position(&decision.ticker).is_none()
            && ledger.open_positions() >= self.max_positions
        {
            return Err(Rejection::MaxPositionsReached {
                max: self.max_positions,
            });
        }

        self.vwap.reset();
        if let Some(bar) = market.bar {
            self.vwap.update(bar.typical_price(), bar.volume);
        }
        let arrival = self.vwap.get_vwap().unwrap_or(0.0);
        if let Verdict::Unsafe(reason) = self.watchdog.check(market.price, arrival, 0.0, 0.0) {
            return Err(Rejection::WatchdogUnsafe(reason));
        }

        let executed_price = self.cost_model.executed_price(market.price, side);
        let commission = self.cost_model.commission(executed_price, quantity);

        kill_switch.ensure_can_trade()?;
        let order = ledger.create_order(
            &decision.ticker,
            side,
            quantity,
            market.price,
            market.timestamp,
        );
        let fill = ledger.fill_order(&order, executed_price, commission, market.timestamp)?;

        if side == OrderSide::Buy {
            if let Some(stop) = decision.stop_loss {
                ledger.set_stop_loss(&decision.ticker, stop);
            }
        }

        debug!(
            ticker = %fill.ticker,
            side = %fill.side,
            quantity = fill.quantity,
            price = fill.executed_price,
            commission = fill.commission,
            "order filled"
        );
        Ok(Some(fill))
    }
}
