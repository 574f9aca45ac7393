//! TemporalClock: the simulated "now".

use chrono::{DateTime, Duration, Utc};

use crate::config::ConfigError;

/// Steps from `start` to `end` inclusive, `interval` apart. Time never moves
/// backwards.
#[derive(Debug, Clone)]
pub struct TemporalClock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
    current: Option<DateTime<Utc>>,
    previous: Option<DateTime<Utc>>,
    steps: u64,
}

impl TemporalClock {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::EmptyRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        if interval <= Duration::zero() {
            return Err(ConfigError::invalid(
                "bar_interval_secs",
                "clock interval must be positive",
            ));
        }
        Ok(Self {
            start,
            end,
            interval,
            current: None,
            previous: None,
            steps: 0,
        })
    }

    /// Move to the next step. Returns `None` once past `end`.
    pub fn advance(&mut self) -> Option<DateTime<Utc>> {
        let next = match self.current {
            None => self.start,
            Some(now) => now + self.interval,
        };
        if next > self.end {
            return None;
        }
        self.previous = self.current;
        self.current = Some(next);
        self.steps += 1;
        Some(next)
    }

    /// Current simulated time; `None` before the first step.
    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.current
    }

    /// Time of the step before the current one.
    pub fn previous(&self) -> Option<DateTime<Utc>> {
        self.previous
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Iterator for TemporalClock {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
