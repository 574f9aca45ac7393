//! MarketDataFeed trait and structured error types.
//!
//! The trait abstracts over data sources (CSV files, synthetic series, live
//! adapters) so the engine can be driven by any of them and by test doubles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Bar, NewsItem, Tick};

/// Live or replayed tick stream for one ticker.
pub type TickStream = Box<dyn Iterator<Item = Tick> + Send>;

/// Structured error types for data access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("data unavailable for '{ticker}': {reason}")]
    Unavailable { ticker: String, reason: String },

    #[error("fetch for '{ticker}' took {elapsed_ms}ms, over the {timeout_ms}ms budget")]
    Timeout {
        ticker: String,
        timeout_ms: u64,
        elapsed_ms: u64,
    },

    #[error("lookahead: '{ticker}' item observable at {item_at} requested as of {as_of}")]
    LookaheadViolation {
        ticker: String,
        item_at: DateTime<Utc>,
        as_of: DateTime<Utc>,
    },

    #[error("'{ticker}' data out of order at {at}")]
    OutOfOrder { ticker: String, at: DateTime<Utc> },

    #[error("invalid bar for '{ticker}' at {at}")]
    InvalidBar { ticker: String, at: DateTime<Utc> },

    #[error("tick stream not supported for '{ticker}'")]
    StreamUnsupported { ticker: String },
}

impl DataError {
    /// Recoverable errors skip the ticker for the step; the rest end the run
    /// (subject to gating policy).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DataError::LookaheadViolation { .. })
    }

    pub fn unavailable(ticker: &str, reason: impl Into<String>) -> Self {
        DataError::Unavailable {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }
}

/// Source of market data.
///
/// Implementations must never return an item observable later than the
/// requested `end`/`as_of`; the engine re-checks regardless.
pub trait MarketDataFeed: Send + Sync {
    /// Bars with `start <= timestamp <= end`, ascending.
    fn get_bars(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError>;

    /// News items observed within `start..=as_of`. Feeds without news return
    /// nothing.
    fn get_news(
        &self,
        _ticker: &str,
        _start: DateTime<Utc>,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, DataError> {
        Ok(Vec::new())
    }

    /// Tick stream for shadow/live execution.
    fn get_tick_stream(&self, ticker: &str) -> Result<TickStream, DataError> {
        Err(DataError::StreamUnsupported {
            ticker: ticker.to_string(),
        })
    }
}

/// Feed backed by in-memory series. Used by the runner after loading files
/// and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeed {
    bars: BTreeMap<String, Vec<Bar>>,
    news: BTreeMap<String, Vec<NewsItem>>,
    ticks: BTreeMap<String, Vec<Tick>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a bar series. Bars are stably sorted by timestamp; insane bars
    /// are refused.
    pub fn insert_bars(&mut self, ticker: &str, mut bars: Vec<Bar>) -> Result<(), DataError> {
        if let Some(bad) = bars.iter().find(|b| !b.is_sane()) {
            return Err(DataError::InvalidBar {
                ticker: ticker.to_string(),
                at: bad.timestamp,
            });
        }
        bars.sort_by_key(|b| b.timestamp);
        self.bars.insert(ticker.to_string(), bars);
        Ok(())
    }

    pub fn insert_news(&mut self, ticker: &str, mut items: Vec<NewsItem>) {
        items.sort_by_key(|n| n.observed_at);
        self.news.insert(ticker.to_string(), items);
    }

    pub fn insert_ticks(&mut self, ticker: &str, mut ticks: Vec<Tick>) {
        ticks.sort_by_key(|t| t.timestamp);
        self.ticks.insert(ticker.to_string(), ticks);
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(|s| s.as_str())
    }

    pub fn bar_count(&self, ticker: &str) -> usize {
        self.bars.get(ticker).map_or(0, |b| b.len())
    }
}

impl MarketDataFeed for InMemoryFeed {
    fn get_bars(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let series = self
            .bars
            .get(ticker)
            .ok_or_else(|| DataError::unavailable(ticker, "unknown ticker"))?;
        let lo = series.partition_point(|b| b.timestamp < start);
        let hi = series.partition_point(|b| b.timestamp <= end);
        Ok(series[lo..hi.max(lo)].to_vec())
    }

    fn get_news(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, DataError> {
        Ok(self
            .news
            .get(ticker)
            .map(|items| {
                items
                    .iter()
                    .filter(|n| n.observed_at >= start && n.observed_at <= as_of)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_tick_stream(&self, ticker: &str) -> Result<TickStream, DataError> {
        let ticks = self
            .ticks
            .get(ticker)
            .cloned()
            .ok_or_else(|| DataError::StreamUnsupported {
                ticker: ticker.to_string(),
            })?;
        Ok(Box::new(ticks.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap() + Duration::days(n)
    }

    fn feed() -> InMemoryFeed {
        let mut feed = InMemoryFeed::new();
        let bars = (0..5)
            .rev()
            .map(|i| Bar::flat("SPY", day(i), 100.0 + i as f64, 1000.0))
            .collect();
        feed.insert_bars("SPY", bars).unwrap();
        feed
    }

    #[test]
    fn bars_are_sorted_on_insert() {
        let bars = feed().get_bars("SPY", day(0), day(4)).unwrap();
        assert!(bars.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(bars.len(), 5);
    }

    #[test]
    fn range_is_inclusive() {
        let bars = feed().get_bars("SPY", day(1), day(3)).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, day(1));
        assert_eq!(bars[2].timestamp, day(3));
    }

    #[test]
    fn unknown_ticker_is_unavailable() {
        let err = feed().get_bars("QQQ", day(0), day(4)).unwrap_err();
        assert!(matches!(err, DataError::Unavailable { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn insane_bar_refused() {
        let mut feed = InMemoryFeed::new();
        let mut bar = Bar::flat("SPY", day(0), 100.0, 1.0);
        bar.high = 50.0;
        assert!(feed.insert_bars("SPY", vec![bar]).is_err());
    }

    #[test]
    fn default_stream_is_unsupported() {
        let err = feed().get_tick_stream("SPY").err().unwrap();
        assert!(matches!(err, DataError::StreamUnsupported { .. }));
    }
}
