//! Cost model: slippage and commission calculation.
//!
//! Slippage is directional: buyers pay more (higher price), sellers receive
//! less (lower price). Commission is a fraction of traded notional.

use std::fmt::Debug;

use crate::config::CostConfig;
use crate::domain::OrderSide;

/// Pluggable execution friction.
pub trait CostModel: Debug + Send + Sync {
    /// Price the trader actually gets for `side` when the reference is `price`.
    fn executed_price(&self, price: f64, side: OrderSide) -> f64;

    /// Commission charged on a fill.
    fn commission(&self, executed_price: f64, quantity: u64) -> f64;

    fn name(&self) -> &'static str;
}

/// Fixed basis-point slippage plus proportional commission.
#[derive(Debug, Clone, PartialEq)]
pub struct BpsCostModel {
    pub slippage_bps: f64,
    pub commission_rate: f64,
}

impl BpsCostModel {
    pub fn new(slippage_bps: f64, commission_rate: f64) -> Self {
        Self {
            slippage_bps,
            commission_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn from_config(config: &CostConfig) -> Self {
        Self::new(config.slippage_bps, config.commission_rate)
    }
}

impl CostModel for BpsCostModel {
    /// `price × (1 + sign × slippage_bps / 10_000)`, sign +1 for buys, -1 for sells.
    fn executed_price(&self, price: f64, side: OrderSide) -> f64 {
        if self.slippage_bps == 0.0 {
            return price;
        }
        price * (1.0 + side.sign() * self.slippage_bps / 10_000.0)
    }

    /// `commission_rate × |executed_price × quantity|`
    fn commission(&self, executed_price: f64, quantity: u64) -> f64 {
        self.commission_rate * (executed_price * quantity as f64).abs()
    }

    fn name(&self) -> &'static str {
        "bps"
    }
}
