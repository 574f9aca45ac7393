//! Decision: the strategy's per-ticker, per-step instruction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// Why a decision was refused before sizing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("conviction {0} outside [0, 1]")]
    Conviction(f64),
    #[error("position_size_pct {0} outside [0, 1]")]
    PositionSize(f64),
    #[error("stop_loss {0} must be positive")]
    StopLoss(f64),
}

/// Strategy output for one ticker at one step. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub ticker: String,
    pub action: Action,
    pub conviction: f64,
    /// Fraction of current equity to commit, in [0, 1].
    pub position_size_pct: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    /// Explicit share count; overrides percentage sizing when set.
    #[serde(default)]
    pub quantity: Option<u64>,
}

impl Decision {
    pub fn hold(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            action: Action::Hold,
            conviction: 0.0,
            position_size_pct: 0.0,
            stop_loss: None,
            quantity: None,
        }
    }

    pub fn buy(ticker: &str, position_size_pct: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            action: Action::Buy,
            conviction: 1.0,
            position_size_pct,
            stop_loss: None,
            quantity: None,
        }
    }

    pub fn sell(ticker: &str, position_size_pct: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            action: Action::Sell,
            conviction: 1.0,
            position_size_pct,
            stop_loss: None,
            quantity: None,
        }
    }

    /// Sell exactly `shares` shares.
    pub fn exit(ticker: &str, shares: u64) -> Self {
        Self {
            quantity: Some(shares),
            ..Self::sell(ticker, 0.0)
        }
    }

    pub fn with_stop_loss(mut self, stop: f64) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    pub fn with_conviction(mut self, conviction: f64) -> Self {
        self.conviction = conviction;
        self
    }

    pub fn is_hold(&self) -> bool {
        self.action == Action::Hold
    }

    /// Range checks on the numeric fields. NaN fails every check.
    pub fn validate(&self) -> Result<(), DecisionError> {
        if !(0.0..=1.0).contains(&self.conviction) {
            return Err(DecisionError::Conviction(self.conviction));
        }
        if !(0.0..=1.0).contains(&self.position_size_pct) {
            return Err(DecisionError::PositionSize(self.position_size_pct));
        }
        if let Some(stop) = self.stop_loss {
            if !(stop > 0.0) {
                return Err(DecisionError::StopLoss(stop));
            }
        }
        Ok(())
    }
}
