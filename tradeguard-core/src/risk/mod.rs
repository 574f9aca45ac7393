//! Risk interlocks.
//!
//! Two independent layers:
//! - [`ExecutionWatchdog`]: per-order anomaly detector returning a verdict.
//!   It owns only its counters; callers decide what to do with `Unsafe`.
//! - [`KillSwitch`]: portfolio-wide breaker shared by every order-submission
//!   path through a [`KillSwitchHandle`]. `HALTED` is left only through a
//!   matching override code.

pub mod kill_switch;
pub mod notify;
pub mod state;
pub mod watchdog;

use thiserror::Error;

pub use kill_switch::{
    Breach, KillReason, KillSwitch, KillSwitchConfig, KillSwitchHandle, KillSwitchStatus,
    OverrideCode, SwitchState,
};
pub use notify::{
    ChannelSink, NotificationSink, NotifyError, NullSink, RiskEvent, RiskEventKind, TracingSink,
};
pub use state::{AccountFigures, TradingState};
pub use watchdog::{ExecutionWatchdog, Verdict, WatchdogConfig, WatchdogReason, WatchdogState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// An order was attempted while the kill switch is halted.
    #[error("trading halted: {reason}")]
    TradingHalted { reason: String },

    /// Deactivation refused; the switch stays halted.
    #[error("invalid override code")]
    InvalidOverride,
}
