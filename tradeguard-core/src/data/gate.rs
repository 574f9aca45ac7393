//! Point-in-time gate.
//!
//! Any item whose availability timestamp is later than the simulated "now"
//! must not reach a strategy. Under [`GatingPolicy::Strict`] such an item is a
//! fatal [`DataError::LookaheadViolation`]; under [`GatingPolicy::Lenient`]
//! the item is dropped and the violation is returned to the caller so it can
//! be logged and surfaced in the run's warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feed::DataError;
use crate::domain::{Bar, NewsItem, Tick};

/// Anything with a moment at which it became observable.
pub trait Timestamped {
    fn available_at(&self) -> DateTime<Utc>;
}

impl Timestamped for Bar {
    fn available_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for NewsItem {
    fn available_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

impl Timestamped for Tick {
    fn available_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingPolicy {
    #[default]
    Strict,
    Lenient,
}

/// Items that passed the gate, plus the violations dropped under the lenient
/// policy.
#[derive(Debug, Clone)]
pub struct Gated<T> {
    pub items: Vec<T>,
    pub violations: Vec<DataError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PointInTimeGate {
    policy: GatingPolicy,
}

impl PointInTimeGate {
    pub fn new(policy: GatingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> GatingPolicy {
        self.policy
    }

    /// Filter `items` to those observable at or before `as_of`.
    pub fn admit<T: Timestamped>(
        &self,
        ticker: &str,
        items: Vec<T>,
        as_of: DateTime<Utc>,
    ) -> Result<Gated<T>, DataError> {
        let mut admitted = Vec::with_capacity(items.len());
        let mut violations = Vec::new();

        for item in items {
            let at = item.available_at();
            if at <= as_of {
                admitted.push(item);
                continue;
            }
            let violation = DataError::LookaheadViolation {
                ticker: ticker.to_string(),
                item_at: at,
                as_of,
            };
            match self.policy {
                GatingPolicy::Strict => return Err(violation),
                GatingPolicy::Lenient => violations.push(violation),
            }
        }

        Ok(Gated {
            items: admitted,
            violations,
        })
    }
}

/// Verify `items` are in non-decreasing availability order.
pub fn check_ordered<T: Timestamped>(ticker: &str, items: &[T]) -> Result<(), DataError> {
    for pair in items.windows(2) {
        if pair[1].available_at() < pair[0].available_at() {
            return Err(DataError::OutOfOrder {
                ticker: ticker.to_string(),
                at: pair[1].available_at(),
            });
        }
    }
    Ok(())
}
