//! Strategy capability and the point-in-time context handed to it.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{Bar, Decision, NewsItem, Position};

/// Everything a strategy may see for one ticker at one step. All items are
/// observable at or before `as_of`.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub ticker: &'a str,
    pub as_of: DateTime<Utc>,
    /// Visible bars, ascending.
    pub bars: &'a [Bar],
    /// Visible news, gated by `observed_at`.
    pub news: &'a [NewsItem],
    pub position: Option<&'a Position>,
    pub cash: f64,
    pub equity: f64,
    /// Net signed order flow over the configured trailing window.
    pub net_flow: f64,
}

impl<'a> StrategyContext<'a> {
    pub fn latest_bar(&self) -> Option<&'a Bar> {
        self.bars.last()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Mean close of the last `n` visible bars; `None` if fewer exist.
    pub fn sma(&self, n: usize) -> Option<f64> {
        if n == 0 || self.bars.len() < n {
            return None;
        }
        let tail = &self.bars[self.bars.len() - n..];
        Some(tail.iter().map(|b| b.close).sum::<f64>() / n as f64)
    }

    pub fn shares_held(&self) -> i64 {
        self.position.map_or(0, |p| p.shares)
    }
}

/// Source of one Decision per ticker per step.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision {
        (**self).decide(ticker, ctx)
    }
}

/// Never trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldStrategy;

impl Strategy for HoldStrategy {
    fn name(&self) -> &str {
        "hold"
    }

    fn decide(&mut self, ticker: &str, _ctx: &StrategyContext<'_>) -> Decision {
        Decision::hold(ticker)
    }
}

/// Replays fixed decisions keyed by ticker and simulated date; holds
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStrategy {
    script: BTreeMap<(String, NaiveDate), Decision>,
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, date: NaiveDate, decision: Decision) -> Self {
        self.script
            .insert((decision.ticker.clone(), date), decision);
        self
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision {
        self.script
            .get(&(ticker.to_string(), ctx.as_of.date_naive()))
            .cloned()
            .unwrap_or_else(|| Decision::hold(ticker))
    }
}
