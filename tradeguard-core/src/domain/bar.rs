//! Market data units: bars, ticks and point-in-time news items.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single ticker.
///
/// `timestamp` is the moment the bar becomes observable (bar close). The
/// point-in-time gate compares against this value, never against the open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Bar whose OHLC are all equal to `price`. Handy for close-only series.
    pub fn flat(ticker: &str, timestamp: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Whether the bar closed at or above its open.
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// A single trade print from a live or replayed stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
    /// Aggressor side when the venue reports it.
    #[serde(default)]
    pub is_buy_initiated: Option<bool>,
}

/// News or analysis item attached to a ticker.
///
/// `subject_date` is the date the item talks about; `observed_at` is when it
/// became known. Gating always uses `observed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub ticker: String,
    pub subject_date: NaiveDate,
    pub observed_at: DateTime<Utc>,
    pub headline: String,
    /// Sentiment score in [-1, 1], if the source provides one.
    #[serde(default)]
    pub sentiment: Option<f64>,
}
