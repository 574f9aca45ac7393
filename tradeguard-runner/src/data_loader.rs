//! Bar and news loading for the runner.
//!
//! `[data]` selects the source:
//! - `csv`: `<dir>/<TICKER>.csv` with `date,open,high,low,close,volume`
//!   (the date column may also be an RFC 3339 timestamp), plus an optional
//!   `<dir>/<TICKER>.news.csv` with
//!   `subject_date,observed_at,headline,sentiment`.
//! - `synthetic`: a seeded random walk per ticker. Developer-only; results
//!   are tagged as synthetic.
//!
//! Either way the result is an [`InMemoryFeed`] plus a BLAKE3 hash over every
//! loaded bar, so two runs can be checked for identical inputs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tradeguard_core::data::{DataError, InMemoryFeed};
use tradeguard_core::domain::{Bar, NewsItem};

use crate::config::{DataConfig, RunConfig, SyntheticConfig};
use crate::synthetic::generate_bars;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no bar file for '{ticker}' (expected {path})")]
    MissingFile { ticker: String, path: PathBuf },

    #[error("failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: unparseable timestamp '{value}'")]
    BadTimestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Csv,
    Synthetic,
}

#[derive(Debug)]
pub struct LoadedData {
    pub feed: InMemoryFeed,
    pub source: DataSource,
    /// BLAKE3 over all bar data, in sorted ticker order.
    pub dataset_hash: String,
    pub bar_counts: BTreeMap<String, usize>,
    pub news_count: usize,
}

impl LoadedData {
    pub fn is_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }
}

/// Load everything `config` needs.
pub fn load_feed(config: &RunConfig) -> Result<LoadedData, LoadError> {
    match &config.data {
        DataConfig::Csv { dir } => load_csv(dir, &config.backtest.tickers),
        DataConfig::Synthetic(synth) => load_synthetic(
            &config.backtest.tickers,
            config.backtest.start_date,
            config.backtest.end_date,
            synth,
        ),
    }
}

/// Read bar (and optional news) files for each ticker from `dir`.
pub fn load_csv(dir: &Path, tickers: &[String]) -> Result<LoadedData, LoadError> {
    let mut series = BTreeMap::new();
    let mut news_count = 0;
    let mut feed = InMemoryFeed::new();

    for ticker in tickers {
        let path = dir.join(format!("{ticker}.csv"));
        if !path.exists() {
            return Err(LoadError::MissingFile {
                ticker: ticker.clone(),
                path,
            });
        }
        let bars = read_bars(&path, ticker)?;
        if bars.is_empty() {
            warn!(ticker = %ticker, path = %path.display(), "bar file has no rows");
        }

        let news_path = dir.join(format!("{ticker}.news.csv"));
        if news_path.exists() {
            let news = read_news(&news_path, ticker)?;
            news_count += news.len();
            feed.insert_news(ticker, news);
        }

        debug!(ticker = %ticker, bars = bars.len(), "loaded bars");
        series.insert(ticker.clone(), bars);
    }

    finish(feed, series, DataSource::Csv, news_count)
}

/// Generate a synthetic series per ticker.
pub fn load_synthetic(
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    config: &SyntheticConfig,
) -> Result<LoadedData, LoadError> {
    warn!(
        seed = config.seed,
        "generating synthetic data; results will be tagged as synthetic"
    );
    let series = tickers
        .iter()
        .map(|t| (t.clone(), generate_bars(t, start, end, config)))
        .collect();
    finish(InMemoryFeed::new(), series, DataSource::Synthetic, 0)
}

fn finish(
    mut feed: InMemoryFeed,
    series: BTreeMap<String, Vec<Bar>>,
    source: DataSource,
    news_count: usize,
) -> Result<LoadedData, LoadError> {
    let dataset_hash = compute_dataset_hash(&series);
    let mut bar_counts = BTreeMap::new();
    for (ticker, bars) in series {
        bar_counts.insert(ticker.clone(), bars.len());
        feed.insert_bars(&ticker, bars)?;
    }
    Ok(LoadedData {
        feed,
        source,
        dataset_hash,
        bar_counts,
        news_count,
    })
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(alias = "timestamp")]
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct NewsRecord {
    subject_date: NaiveDate,
    observed_at: String,
    headline: String,
    #[serde(default)]
    sentiment: Option<f64>,
}

/// Read one bar file. Rows keep file order; the feed sorts on insert.
pub fn read_bars(path: &Path, ticker: &str) -> Result<Vec<Bar>, LoadError> {
    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<BarRecord>().enumerate() {
        let record = record.map_err(csv_err)?;
        let timestamp = parse_timestamp(&record.date).ok_or_else(|| LoadError::BadTimestamp {
            path: path.to_path_buf(),
            row: row + 1,
            value: record.date.clone(),
        })?;
        bars.push(Bar {
            ticker: ticker.to_string(),
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }
    Ok(bars)
}

/// Read one news file.
pub fn read_news(path: &Path, ticker: &str) -> Result<Vec<NewsItem>, LoadError> {
    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut items = Vec::new();
    for (row, record) in reader.deserialize::<NewsRecord>().enumerate() {
        let record = record.map_err(csv_err)?;
        let observed_at =
            parse_timestamp(&record.observed_at).ok_or_else(|| LoadError::BadTimestamp {
                path: path.to_path_buf(),
                row: row + 1,
                value: record.observed_at.clone(),
            })?;
        items.push(NewsItem {
            ticker: ticker.to_string(),
            subject_date: record.subject_date,
            observed_at,
            headline: record.headline,
            sentiment: record.sentiment,
        });
    }
    Ok(items)
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (midnight UTC).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Deterministic BLAKE3 hash over all bar data in sorted ticker order.
fn compute_dataset_hash(series: &BTreeMap<String, Vec<Bar>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (ticker, bars) in series {
        hasher.update(ticker.as_bytes());
        for bar in bars {
            hasher.update(&bar.timestamp.timestamp().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
