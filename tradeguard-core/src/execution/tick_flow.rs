//! Sliding-window net order-flow meter.
//!
//! Ticks are kept in a bounded deque in arrival (timestamp) order, so both
//! capacity eviction and age pruning pop from the front in amortized O(1).

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Default bound on retained ticks.
pub const DEFAULT_FLOW_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("tick at {at} is older than the last accepted tick at {last}")]
    OutOfOrder {
        at: DateTime<Utc>,
        last: DateTime<Utc>,
    },
    #[error("tick has non-finite or negative price/volume")]
    InvalidTick,
}

#[derive(Debug, Clone, Copy)]
struct FlowTick {
    timestamp: DateTime<Utc>,
    /// price × volume, positive when buy-initiated.
    signed_notional: f64,
}

#[derive(Debug, Clone)]
pub struct TickFlowMeter {
    ticks: VecDeque<FlowTick>,
    capacity: usize,
    evicted: u64,
}

impl Default for TickFlowMeter {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FLOW_CAPACITY)
    }
}

impl TickFlowMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meter that never retains more than `capacity` ticks (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            evicted: 0,
        }
    }

    /// Record a tick. Timestamps must be non-decreasing.
    pub fn add_tick(
        &mut self,
        timestamp: DateTime<Utc>,
        price: f64,
        volume: f64,
        is_buy_initiated: bool,
    ) -> Result<(), FlowError> {
        if !price.is_finite() || !volume.is_finite() || price < 0.0 || volume < 0.0 {
            return Err(FlowError::InvalidTick);
        }
        if let Some(last) = self.ticks.back() {
            if timestamp < last.timestamp {
                return Err(FlowError::OutOfOrder {
                    at: timestamp,
                    last: last.timestamp,
                });
            }
        }
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
            self.evicted += 1;
        }
        let sign = if is_buy_initiated { 1.0 } else { -1.0 };
        self.ticks.push_back(FlowTick {
            timestamp,
            signed_notional: sign * price * volume,
        });
        Ok(())
    }

    /// Net signed notional over ticks with `now - window <= timestamp <= now`.
    pub fn get_flow(&self, window: Duration, now: DateTime<Utc>) -> f64 {
        let cutoff = now - window;
        let mut flow = 0.0;
        for tick in self.ticks.iter().rev() {
            if tick.timestamp > now {
                continue;
            }
            if tick.timestamp < cutoff {
                break;
            }
            flow += tick.signed_notional;
        }
        flow
    }

    /// Drop ticks older than `now - max_age`. Returns how many were removed.
    pub fn cleanup(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let cutoff = now - max_age;
        let mut removed = 0;
        while self.ticks.front().is_some_and(|t| t.timestamp < cutoff) {
            self.ticks.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ticks dropped because the buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap()
    }

    #[test]
    fn old_tick_outside_window_contributes_nothing() {
        let mut meter = TickFlowMeter::new();
        meter
            .add_tick(t() - Duration::seconds(20), 100.0, 10.0, true)
            .unwrap();
        assert_eq!(meter.get_flow(Duration::seconds(10), t()), 0.0);
    }

    #[test]
    fn buys_add_sells_subtract() {
        let mut meter = TickFlowMeter::new();
        meter.add_tick(t() - Duration::seconds(5), 100.0, 10.0, true).unwrap();
        meter.add_tick(t() - Duration::seconds(2), 50.0, 4.0, false).unwrap();
        // 1000 - 200
        assert!((meter.get_flow(Duration::seconds(10), t()) - 800.0).abs() < 1e-12);
    }

    #[test]
    fn window_edges_are_inclusive() {
        let mut meter = TickFlowMeter::new();
        meter.add_tick(t() - Duration::seconds(10), 1.0, 1.0, true).unwrap();
        meter.add_tick(t(), 1.0, 1.0, true).unwrap();
        assert_eq!(meter.get_flow(Duration::seconds(10), t()), 2.0);
    }

    #[test]
    fn ticks_after_now_are_ignored() {
        let mut meter = TickFlowMeter::new();
        meter.add_tick(t(), 1.0, 1.0, true).unwrap();
        meter.add_tick(t() + Duration::seconds(1), 1.0, 100.0, true).unwrap();
        assert_eq!(meter.get_flow(Duration::seconds(10), t()), 1.0);
    }

    #[test]
    fn out_of_order_rejected() {
        let mut meter = TickFlowMeter::new();
        meter.add_tick(t(), 1.0, 1.0, true).unwrap();
        let err = meter
            .add_tick(t() - Duration::seconds(1), 1.0, 1.0, true)
            .unwrap_err();
        assert!(matches!(err, FlowError::OutOfOrder { .. }));
    }

    #[test]
    fn cleanup_prunes_by_age() {
        let mut meter = TickFlowMeter::new();
        for s in 0..10 {
            meter
                .add_tick(t() + Duration::seconds(s), 1.0, 1.0, true)
                .unwrap();
        }
        let removed = meter.cleanup(t() + Duration::seconds(9), Duration::seconds(4));
        assert_eq!(removed, 5);
        assert_eq!(meter.len(), 5);
    }

    #[test]
    fn capacity_bounds_memory() {
        let mut meter = TickFlowMeter::with_capacity(3);
        for s in 0..5 {
            meter
                .add_tick(t() + Duration::seconds(s), 1.0, 1.0, true)
                .unwrap();
        }
        assert_eq!(meter.len(), 3);
        assert_eq!(meter.evicted(), 2);
    }
}
