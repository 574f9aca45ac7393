//! ShadowSession: parent orders worked in child slices against a tick stream.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{positive, ConfigError};
use crate::data::{DataError, MarketDataFeed};
use crate::domain::{Fill, OrderSide, Tick};
use crate::execution::{ArrivalVwap, CostModel, Rejection, TickFlowMeter};
use crate::ledger::PortfolioLedger;
use crate::risk::{ExecutionWatchdog, KillSwitchHandle, Verdict, WatchdogReason};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Largest share of each print's volume a child slice may take.
    pub participation_rate: f64,
    pub flow_window_secs: i64,
    pub flow_capacity: usize,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            participation_rate: 0.1,
            flow_window_secs: 60,
            flow_capacity: 100_000,
        }
    }
}

impl ShadowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("participation_rate", self.participation_rate)?;
        if self.participation_rate > 1.0 {
            return Err(ConfigError::invalid(
                "participation_rate",
                format!("{} must be <= 1", self.participation_rate),
            ));
        }
        if self.flow_window_secs <= 0 {
            return Err(ConfigError::invalid("flow_window_secs", "must be > 0"));
        }
        if self.flow_capacity == 0 {
            return Err(ConfigError::invalid("flow_capacity", "must be >= 1"));
        }
        Ok(())
    }
}

/// A parent order worked in child slices until `deadline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentOrder {
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParentOutcome {
    Completed,
    /// Stream ended or deadline passed before the order completed.
    Expired,
    /// Watchdog verdict was unsafe; remaining quantity abandoned.
    Cancelled { reason: WatchdogReason },
    /// Kill switch was halted before a child could be committed.
    Halted { reason: String },
    /// Ledger refused a child fill.
    Rejected { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowReport {
    pub order: ParentOrder,
    pub filled: u64,
    pub child_fills: Vec<Fill>,
    pub avg_price: Option<f64>,
    pub arrival_vwap: Option<f64>,
    /// Execution cost against the arrival VWAP, positive when adverse.
    pub slippage_vs_vwap_bps: Option<f64>,
    pub net_flow: f64,
    pub outcome: ParentOutcome,
}

impl ShadowReport {
    pub fn fill_rate(&self) -> f64 {
        if self.order.quantity == 0 {
            return 0.0;
        }
        self.filled as f64 / self.order.quantity as f64
    }
}

/// Order-flow state for one ticker's stream.
#[derive(Debug)]
struct TickerFlow {
    meter: TickFlowMeter,
    last_price: Option<f64>,
}

/// Works parent orders against ticks with the same interlocks as the
/// backtest. The kill switch is re-checked before every child fill.
#[derive(Debug)]
pub struct ShadowSession {
    config: ShadowConfig,
    cost_model: Box<dyn CostModel>,
    watchdog: ExecutionWatchdog,
    vwap: ArrivalVwap,
    flow: BTreeMap<String, TickerFlow>,
    kill_switch: KillSwitchHandle,
}

impl ShadowSession {
    pub fn new(
        config: ShadowConfig,
        cost_model: Box<dyn CostModel>,
        watchdog: ExecutionWatchdog,
        kill_switch: KillSwitchHandle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            cost_model,
            watchdog,
            vwap: ArrivalVwap::new(),
            flow: BTreeMap::new(),
            kill_switch,
        })
    }

    pub fn watchdog(&self) -> &ExecutionWatchdog {
        &self.watchdog
    }

    /// Net order flow for `ticker` over the configured window; 0 for a
    /// ticker never seen.
    pub fn net_flow(&self, ticker: &str, now: DateTime<Utc>) -> f64 {
        self.flow
            .get(ticker)
            .map_or(0.0, |f| f.meter.get_flow(self.flow_window(), now))
    }

    fn flow_window(&self) -> Duration {
        Duration::seconds(self.config.flow_window_secs)
    }

    /// Pull the ticker's stream from `feed` and work `order` against it.
    pub fn run_from_feed(
        &mut self,
        feed: &dyn MarketDataFeed,
        order: &ParentOrder,
        ledger: &mut PortfolioLedger,
    ) -> Result<ShadowReport, DataError> {
        let stream = feed.get_tick_stream(&order.ticker)?;
        Ok(self.execute_parent(order, stream, ledger))
    }

    pub fn execute_parent(
        &mut self,
        order: &ParentOrder,
        ticks: impl IntoIterator<Item = Tick>,
        ledger: &mut PortfolioLedger,
    ) -> ShadowReport {
        self.vwap.reset();
        let mut fills: Vec<Fill> = Vec::new();
        let mut filled = 0u64;
        let mut now = order.started_at;
        let horizon = (order.deadline - order.started_at).num_milliseconds().max(1) as f64;

        let outcome = 'work: {
            if let Err(e) = self.kill_switch.ensure_can_trade() {
                break 'work halted(e.to_string());
            }
            for tick in ticks {
                if tick.ticker != order.ticker || tick.timestamp < order.started_at {
                    continue;
                }
                if tick.timestamp > order.deadline {
                    break;
                }
                now = tick.timestamp;
                if !self.ingest(&tick) {
                    continue;
                }

                let elapsed = ((tick.timestamp - order.started_at).num_milliseconds() as f64
                    / horizon)
                    .clamp(0.0, 1.0);
                let fill_rate = filled as f64 / order.quantity.max(1) as f64;
                let arrival = self.vwap.get_vwap().unwrap_or(0.0);
                if let Verdict::Unsafe(reason) =
                    self.watchdog.check(tick.price, arrival, elapsed, fill_rate)
                {
                    break 'work ParentOutcome::Cancelled { reason };
                }

                let slice = ((tick.volume * self.config.participation_rate).floor() as u64)
                    .min(order.quantity - filled);
                if slice == 0 {
                    continue;
                }

                if let Err(e) = self.kill_switch.ensure_can_trade() {
                    break 'work halted(e.to_string());
                }
                let price = self.cost_model.executed_price(tick.price, order.side);
                let commission = self.cost_model.commission(price, slice);
                let child =
                    ledger.create_order(&order.ticker, order.side, slice, tick.price, tick.timestamp);
                match ledger.fill_order(&child, price, commission, tick.timestamp) {
                    Ok(fill) => {
                        debug!(ticker = %fill.ticker, quantity = slice, price, "child filled");
                        filled += slice;
                        fills.push(fill);
                    }
                    Err(e) => {
                        self.watchdog.report_error();
                        let rejection = Rejection::from(e);
                        break 'work ParentOutcome::Rejected {
                            kind: rejection.kind().to_string(),
                            message: rejection.to_string(),
                        };
                    }
                }
                if filled == order.quantity {
                    break 'work ParentOutcome::Completed;
                }
            }
            if filled == order.quantity {
                ParentOutcome::Completed
            } else {
                ParentOutcome::Expired
            }
        };

        let window = self.flow_window();
        if let Some(flow) = self.flow.get_mut(&order.ticker) {
            flow.meter.cleanup(now, window);
        }
        let report = self.report(order, fills, filled, now, outcome);
        info!(
            ticker = %order.ticker,
            side = %order.side,
            filled = report.filled,
            quantity = order.quantity,
            outcome = ?report.outcome,
            "parent order finished"
        );
        report
    }

    /// Feed one tick to the VWAP and flow meter. Returns false if the tick
    /// was unusable.
    fn ingest(&mut self, tick: &Tick) -> bool {
        let capacity = self.config.flow_capacity;
        let flow = self
            .flow
            .entry(tick.ticker.clone())
            .or_insert_with(|| TickerFlow {
                meter: TickFlowMeter::with_capacity(capacity),
                last_price: None,
            });
        let is_buy = tick
            .is_buy_initiated
            .unwrap_or_else(|| flow.last_price.map_or(true, |last| tick.price >= last));
        if let Err(e) = flow
            .meter
            .add_tick(tick.timestamp, tick.price, tick.volume, is_buy)
        {
            warn!(ticker = %tick.ticker, error = %e, "tick rejected");
            self.watchdog.report_error();
            return false;
        }
        flow.last_price = Some(tick.price);
        self.vwap.update(tick.price, tick.volume);
        true
    }

    fn report(
        &self,
        order: &ParentOrder,
        fills: Vec<Fill>,
        filled: u64,
        now: DateTime<Utc>,
        outcome: ParentOutcome,
    ) -> ShadowReport {
        let avg_price = (filled > 0)
            .then(|| fills.iter().map(Fill::gross_amount).sum::<f64>() / filled as f64);
        let arrival_vwap = self.vwap.get_vwap();
        let slippage_vs_vwap_bps = match (avg_price, arrival_vwap) {
            (Some(avg), Some(vwap)) => Some(order.side.sign() * (avg - vwap) / vwap * 10_000.0),
            _ => None,
        };
        ShadowReport {
            order: order.clone(),
            filled,
            child_fills: fills,
            avg_price,
            arrival_vwap,
            slippage_vs_vwap_bps,
            net_flow: self.net_flow(&order.ticker, now),
            outcome,
        }
    }
}

fn halted(reason: String) -> ParentOutcome {
    ParentOutcome::Halted { reason }
}
