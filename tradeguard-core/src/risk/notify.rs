//! Notification sinks for kill-switch transitions.
//!
//! Delivery is best-effort: the switch changes state first, releases its
//! lock, then hands the event to the sink. A sink error is logged by the
//! switch and otherwise ignored.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    Triggered,
    Deactivated,
    OverrideRejected,
}

impl fmt::Display for RiskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskEventKind::Triggered => "triggered",
            RiskEventKind::Deactivated => "deactivated",
            RiskEventKind::OverrideRejected => "override_rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub kind: RiskEventKind,
    pub reason: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification receiver disconnected")]
    Disconnected,
    #[error("notification failed: {0}")]
    Failed(String),
}

/// External channel for risk events. Must not block.
pub trait NotificationSink: Send + Sync + fmt::Debug {
    fn notify(&self, event: &RiskEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _event: &RiskEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes each event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &RiskEvent) -> Result<(), NotifyError> {
        match event.kind {
            RiskEventKind::Triggered => error!(
                kind = %event.kind,
                reason = %event.reason,
                details = %event.details,
                at = %event.timestamp,
                "kill switch event"
            ),
            _ => info!(
                kind = %event.kind,
                reason = %event.reason,
                details = %event.details,
                at = %event.timestamp,
                "kill switch event"
            ),
        }
        Ok(())
    }
}

/// Forwards events over an unbounded `mpsc` channel, so `notify` never
/// blocks the caller.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<RiskEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<RiskEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: &RiskEvent) -> Result<(), NotifyError> {
        self.sender
            .send(event.clone())
            .map_err(|_| NotifyError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RiskEvent {
        RiskEvent {
            kind: RiskEventKind::Triggered,
            reason: "DAILY_LOSS".into(),
            details: "daily_loss_pct -5.50 <= -5.00".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn channel_sink_delivers() {
        let (sink, rx) = ChannelSink::new();
        sink.notify(&event()).unwrap();
        assert_eq!(rx.try_recv().unwrap().reason, "DAILY_LOSS");
    }

    #[test]
    fn channel_sink_reports_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert_eq!(sink.notify(&event()), Err(NotifyError::Disconnected));
    }

    #[test]
    fn event_kind_serializes_snake_case() {
        let json = serde_json::to_string(&RiskEventKind::OverrideRejected).unwrap();
        assert_eq!(json, "\"override_rejected\"");
    }
}
