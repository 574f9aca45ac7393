//! KillSwitch: portfolio-wide circuit breaker.
//!
//! State machine `ACTIVE ⇄ HALTED`:
//! - `trigger` moves to HALTED synchronously under a write lock. Triggering
//!   an already-halted switch keeps the first reason.
//! - `deactivate` moves back to ACTIVE only with the configured override
//!   code. A switch built without a code can never be deactivated.
//!
//! Notifications are sent after the lock is released and never block or
//! undo a transition.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::notify::{NotificationSink, RiskEvent, RiskEventKind, TracingSink};
use super::state::TradingState;
use super::RiskError;
use crate::config::{positive, ConfigError};

/// Shared handle passed to every order-submission path.
pub type KillSwitchHandle = Arc<KillSwitch>;

// ── Override code ───────────────────────────────────────────────────

/// Operator secret. Never printed and never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct OverrideCode(String);

impl OverrideCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comparison whose running time does not depend on where the first
    /// mismatching byte is.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let given = candidate.as_bytes();
        if expected.len() != given.len() {
            return false;
        }
        expected
            .iter()
            .zip(given)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for OverrideCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OverrideCode(***)")
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    /// Percent (5.0 = 5%).
    pub max_daily_loss_pct: f64,
    /// Percent below peak equity.
    pub max_drawdown_pct: f64,
    pub max_api_error_count: u32,
    /// Largest position / equity, as a fraction.
    pub max_position_concentration: f64,
    pub price_stale_minutes: f64,
    pub max_daily_trades: u32,
    #[serde(default, skip_serializing)]
    pub override_code: Option<OverrideCode>,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 5.0,
            max_drawdown_pct: 15.0,
            max_api_error_count: 5,
            max_position_concentration: 0.3,
            // Five days, so a holiday weekend in daily bars is not stale.
            price_stale_minutes: 7_200.0,
            max_daily_trades: 50,
            override_code: None,
        }
    }
}

impl KillSwitchConfig {
    pub fn with_override_code(mut self, code: impl Into<String>) -> Self {
        self.override_code = Some(OverrideCode::new(code));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_daily_loss_pct", self.max_daily_loss_pct)?;
        positive("max_drawdown_pct", self.max_drawdown_pct)?;
        if self.max_drawdown_pct > 100.0 {
            return Err(ConfigError::invalid(
                "max_drawdown_pct",
                format!("{} is above 100%", self.max_drawdown_pct),
            ));
        }
        if self.max_api_error_count == 0 {
            return Err(ConfigError::invalid("max_api_error_count", "must be >= 1"));
        }
        positive("max_position_concentration", self.max_position_concentration)?;
        if self.max_position_concentration > 1.0 {
            return Err(ConfigError::invalid(
                "max_position_concentration",
                format!("{} is a fraction and must be <= 1", self.max_position_concentration),
            ));
        }
        positive("price_stale_minutes", self.price_stale_minutes)?;
        if self.max_daily_trades == 0 {
            return Err(ConfigError::invalid("max_daily_trades", "must be >= 1"));
        }
        if self.override_code.as_ref().is_some_and(OverrideCode::is_empty) {
            return Err(ConfigError::invalid("override_code", "must not be empty"));
        }
        Ok(())
    }

    /// First breached threshold, in fixed order. A missing or non-finite
    /// field is itself a breach.
    pub fn evaluate(&self, state: &TradingState) -> Option<Breach> {
        self.first_breach(state).err()
    }

    fn first_breach(&self, state: &TradingState) -> Result<(), Breach> {
        let daily = required("daily_loss_pct", state.daily_loss_pct)?;
        if daily <= -self.max_daily_loss_pct {
            return Err(Breach::new(KillReason::DailyLoss, daily, -self.max_daily_loss_pct));
        }

        let drawdown = required("drawdown_pct", state.drawdown_pct)?;
        if drawdown <= -self.max_drawdown_pct {
            return Err(Breach::new(KillReason::Drawdown, drawdown, -self.max_drawdown_pct));
        }

        let errors = required_count("api_error_count", state.api_error_count)?;
        if errors >= self.max_api_error_count {
            return Err(Breach::new(
                KillReason::ApiErrors,
                errors as f64,
                self.max_api_error_count as f64,
            ));
        }

        let concentration = required("position_concentration", state.position_concentration)?;
        if concentration > self.max_position_concentration {
            return Err(Breach::new(
                KillReason::Concentration,
                concentration,
                self.max_position_concentration,
            ));
        }

        let stale = required("stale_data_age_minutes", state.stale_data_age_minutes)?;
        if stale > self.price_stale_minutes {
            return Err(Breach::new(KillReason::StaleData, stale, self.price_stale_minutes));
        }

        let trades = required_count("daily_trade_count", state.daily_trade_count)?;
        if trades >= self.max_daily_trades {
            return Err(Breach::new(
                KillReason::DailyTradeLimit,
                trades as f64,
                self.max_daily_trades as f64,
            ));
        }
        Ok(())
    }
}

fn required(field: &'static str, value: Option<f64>) -> Result<f64, Breach> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(Breach::malformed(field)),
    }
}

fn required_count(field: &'static str, value: Option<u32>) -> Result<u32, Breach> {
    value.ok_or_else(|| Breach::malformed(field))
}

// ── Reasons and breaches ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillReason {
    DailyLoss,
    Drawdown,
    ApiErrors,
    Concentration,
    StaleData,
    DailyTradeLimit,
    MalformedState,
    Manual,
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KillReason::DailyLoss => "DAILY_LOSS",
            KillReason::Drawdown => "DRAWDOWN",
            KillReason::ApiErrors => "API_ERRORS",
            KillReason::Concentration => "CONCENTRATION",
            KillReason::StaleData => "STALE_DATA",
            KillReason::DailyTradeLimit => "DAILY_TRADE_LIMIT",
            KillReason::MalformedState => "MALFORMED_STATE",
            KillReason::Manual => "MANUAL",
        };
        f.write_str(s)
    }
}

/// A threshold that was crossed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breach {
    pub reason: KillReason,
    /// Observed value, or NaN for a malformed field.
    pub observed: f64,
    pub limit: f64,
    /// Name of the missing field for `MalformedState`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl Breach {
    fn new(reason: KillReason, observed: f64, limit: f64) -> Self {
        Self {
            reason,
            observed,
            limit,
            field: None,
        }
    }

    fn malformed(field: &'static str) -> Self {
        Self {
            reason: KillReason::MalformedState,
            observed: f64::NAN,
            limit: f64::NAN,
            field: Some(field),
        }
    }

    pub fn details(&self) -> String {
        match self.reason {
            KillReason::MalformedState => format!(
                "trading state field `{}` missing or not finite",
                self.field.unwrap_or("?")
            ),
            KillReason::DailyLoss | KillReason::Drawdown => {
                format!("{:.2}% breached limit {:.2}%", self.observed, self.limit)
            }
            KillReason::Concentration => format!(
                "largest position {:.1}% of equity exceeds {:.1}%",
                self.observed * 100.0,
                self.limit * 100.0
            ),
            _ => format!("{} breached limit {}", self.observed, self.limit),
        }
    }
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.details())
    }
}

// ── Switch ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchState {
    #[default]
    Active,
    Halted,
}

/// Point-in-time copy of the switch for monitoring and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    pub state: SwitchState,
    pub trigger_reason: Option<KillReason>,
    pub details: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub thresholds: KillSwitchConfig,
}

impl KillSwitchStatus {
    pub fn is_halted(&self) -> bool {
        self.state == SwitchState::Halted
    }
}

#[derive(Debug, Default)]
struct SwitchInner {
    state: SwitchState,
    reason: Option<KillReason>,
    details: Option<String>,
    triggered_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct KillSwitch {
    config: KillSwitchConfig,
    inner: RwLock<SwitchInner>,
    sink: Arc<dyn NotificationSink>,
}

impl KillSwitch {
    /// Switch that reports events to the log.
    pub fn new(config: KillSwitchConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        config: KillSwitchConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.override_code.is_none() {
            warn!("kill switch has no override code; a halt will be permanent");
        }
        Ok(Self {
            config,
            inner: RwLock::new(SwitchInner::default()),
            sink,
        })
    }

    pub fn into_handle(self) -> KillSwitchHandle {
        Arc::new(self)
    }

    pub fn config(&self) -> &KillSwitchConfig {
        &self.config
    }

    /// Pure threshold check; does not change state.
    pub fn evaluate(&self, state: &TradingState) -> Option<Breach> {
        self.config.evaluate(state)
    }

    /// Evaluate and halt on the first breach.
    pub fn check_and_trigger(&self, state: &TradingState, at: DateTime<Utc>) -> Option<Breach> {
        let breach = self.evaluate(state)?;
        self.trigger_at(breach.reason, &breach.details(), at);
        Some(breach)
    }

    pub fn can_trade(&self) -> bool {
        self.inner.read().state == SwitchState::Active
    }

    /// `Err(TradingHalted)` while halted. Call immediately before committing
    /// an order.
    pub fn ensure_can_trade(&self) -> Result<(), RiskError> {
        let inner = self.inner.read();
        match inner.state {
            SwitchState::Active => Ok(()),
            SwitchState::Halted => Err(RiskError::TradingHalted {
                reason: inner
                    .reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
        }
    }

    /// Halt now. Returns `false` if the switch was already halted.
    pub fn trigger(&self, reason: KillReason, details: &str) -> bool {
        self.trigger_at(reason, details, Utc::now())
    }

    /// Halt, stamping `at` (simulated time in backtests).
    pub fn trigger_at(&self, reason: KillReason, details: &str, at: DateTime<Utc>) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.state == SwitchState::Halted {
                return false;
            }
            inner.state = SwitchState::Halted;
            inner.reason = Some(reason);
            inner.details = Some(details.to_string());
            inner.triggered_at = Some(at);
        }
        error!(%reason, details, at = %at, "kill switch triggered; trading halted");
        self.emit(RiskEvent {
            kind: RiskEventKind::Triggered,
            reason: reason.to_string(),
            details: details.to_string(),
            timestamp: at,
        });
        true
    }

    /// Return to ACTIVE if `code` matches the configured override.
    pub fn deactivate(&self, code: &str, reason: &str) -> Result<(), RiskError> {
        self.deactivate_at(code, reason, Utc::now())
    }

    pub fn deactivate_at(
        &self,
        code: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        let authorized = self
            .config
            .override_code
            .as_ref()
            .is_some_and(|expected| expected.matches(code));
        if !authorized {
            warn!(reason, "kill switch override rejected");
            self.emit(RiskEvent {
                kind: RiskEventKind::OverrideRejected,
                reason: reason.to_string(),
                details: "override code did not match".to_string(),
                timestamp: at,
            });
            return Err(RiskError::InvalidOverride);
        }

        let previous = {
            let mut inner = self.inner.write();
            if inner.state == SwitchState::Active {
                return Ok(());
            }
            let previous = inner.reason.take();
            *inner = SwitchInner::default();
            previous
        };
        info!(
            reason,
            previous = %previous.map(|r| r.to_string()).unwrap_or_default(),
            "kill switch deactivated by override"
        );
        self.emit(RiskEvent {
            kind: RiskEventKind::Deactivated,
            reason: reason.to_string(),
            details: format!(
                "cleared {}",
                previous.map(|r| r.to_string()).unwrap_or_default()
            ),
            timestamp: at,
        });
        Ok(())
    }

    /// Snapshot for monitoring. The override code is not included.
    pub fn status(&self) -> KillSwitchStatus {
        let inner = self.inner.read();
        KillSwitchStatus {
            state: inner.state,
            trigger_reason: inner.reason,
            details: inner.details.clone(),
            triggered_at: inner.triggered_at,
            thresholds: KillSwitchConfig {
                override_code: None,
                ..self.config.clone()
            },
        }
    }

    fn emit(&self, event: RiskEvent) {
        if let Err(e) = self.sink.notify(&event) {
            warn!(error = %e, kind = %event.kind, "risk notification not delivered");
        }
    }
}
