//! BacktestEngine: drives the TemporalClock and orchestrates each step.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::clock::TemporalClock;
use super::result::{BacktestResult, DataErrorRecord, RejectionRecord};
use super::strategy::{Strategy, StrategyContext};
use crate::config::{ConfigError, EngineConfig};
use crate::data::{check_ordered, DataError, GatingPolicy, MarketDataFeed, PointInTimeGate};
use crate::domain::{Bar, Decision, NewsItem};
use crate::execution::{ExecutionSimulator, MarketSnapshot, TickFlowMeter};
use crate::ledger::PortfolioLedger;
use crate::performance::PerformanceAnalyzer;
use crate::risk::{AccountFigures, KillSwitch, KillSwitchHandle, TradingState};

/// Conditions that end a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// Future-dated data under the strict gating policy.
    #[error("{0}")]
    Lookahead(DataError),
}

#[derive(Clone)]
pub struct BacktestEngine {
    feed: Arc<dyn MarketDataFeed>,
    config: EngineConfig,
    kill_switch: KillSwitchHandle,
    cancel: CancellationToken,
}

impl fmt::Debug for BacktestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacktestEngine")
            .field("config", &self.config)
            .field("kill_switch", &self.kill_switch.status().state)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl BacktestEngine {
    /// Validates the config and builds a session kill switch from it.
    pub fn new(feed: Arc<dyn MarketDataFeed>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let kill_switch = KillSwitch::new(config.kill_switch.clone())?.into_handle();
        Ok(Self {
            feed,
            config,
            kill_switch,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned kill switch (e.g. shared with a live session).
    pub fn with_kill_switch(mut self, kill_switch: KillSwitchHandle) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn kill_switch(&self) -> &KillSwitchHandle {
        &self.kill_switch
    }

    /// Replay `[start, end]` for `tickers` (duplicates dropped, order kept).
    ///
    /// Per-ticker data failures and order rejections are recorded in the
    /// result; only configuration errors and strict-mode lookahead end the
    /// run early.
    pub fn run(
        &self,
        strategy: &mut dyn Strategy,
        tickers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BacktestResult, EngineError> {
        let universe = dedup_tickers(tickers);
        if universe.is_empty() {
            return Err(ConfigError::EmptyUniverse.into());
        }
        let mut clock =
            TemporalClock::new(start, end, Duration::seconds(self.config.bar_interval_secs))?;
        let mut run = RunState::new(&self.config)?;

        info!(
            strategy = strategy.name(),
            tickers = universe.len(),
            %start,
            %end,
            capital = self.config.initial_capital,
            gating = ?self.config.gating,
            "backtest started"
        );

        let mut cancelled = false;
        while let Some(now) = clock.advance() {
            if self.cancel.is_cancelled() {
                info!(%now, "backtest cancelled at step boundary");
                cancelled = true;
                break;
            }
            run.roll_day(now, self.config.watchdog_reset_daily);

            for ticker in &universe {
                self.step_ticker(&mut run, strategy, ticker, start, clock.previous(), now)?;
            }

            let point = run.ledger.snapshot(now);
            run.peak_equity = run.peak_equity.max(point.equity);
            self.evaluate_kill_switch(&mut run, now);
        }

        let result = run.finish(strategy.name(), clock.steps_taken(), &self.kill_switch, cancelled);
        info!(
            final_equity = result.final_equity,
            total_return = result.total_return,
            trades = result.total_trades,
            rejections = result.rejections.len(),
            data_errors = result.data_errors.len(),
            halted = result.halted(),
            "backtest finished"
        );
        Ok(result)
    }

    // ─── Per-ticker step ────────────────────────────────────────────

    fn step_ticker(
        &self,
        run: &mut RunState,
        strategy: &mut dyn Strategy,
        ticker: &str,
        start: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let (bars, news) = match self.fetch_visible(run, ticker, start, now) {
            Ok(visible) => visible,
            Err(e) if !e.is_recoverable() => {
                if self.config.gating == GatingPolicy::Strict {
                    return Err(EngineError::Lookahead(e));
                }
                warn!(ticker, %now, error = %e, "feed returned future data; ticker skipped");
                run.warnings.push(e.to_string());
                return Ok(());
            }
            Err(e) => {
                run.record_data_error(now, ticker, &e);
                return Ok(());
            }
        };

        let Some(latest) = bars.last() else {
            run.record_data_error(now, ticker, &DataError::unavailable(ticker, "no visible bars"));
            return Ok(());
        };
        if previous.is_some_and(|prev| latest.timestamp <= prev) {
            // No new bar since the last step.
            return Ok(());
        }

        run.ledger.mark(ticker, latest.close, latest.timestamp);
        let net_flow = run.update_flow(ticker, &bars, now, self.flow_window());

        let snapshot = MarketSnapshot::from_bar(latest);
        if let Some(exit) = stop_loss_exit(&run.ledger, ticker, latest.close) {
            info!(ticker, close = latest.close, "stop-loss hit; exiting position");
            run.execute(&exit, &snapshot, &self.kill_switch);
        }

        let decision = {
            let ctx = StrategyContext {
                ticker,
                as_of: now,
                bars: &bars,
                news: &news,
                position: run.ledger.position(ticker),
                cash: run.ledger.cash(),
                equity: run.ledger.equity(),
                net_flow,
            };
            strategy.decide(ticker, &ctx)
        };
        if decision.ticker != ticker {
            let msg = format!(
                "strategy returned a decision for '{}' when asked about '{ticker}'; ignored",
                decision.ticker
            );
            warn!(%now, "{}", msg);
            run.warnings.push(msg);
            return Ok(());
        }
        run.execute(&decision, &snapshot, &self.kill_switch);
        Ok(())
    }

    /// Bars and news observable at `now`, after timeout, ordering and
    /// point-in-time checks.
    fn fetch_visible(
        &self,
        run: &mut RunState,
        ticker: &str,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Bar>, Vec<NewsItem>), DataError> {
        let bars = self.timed(ticker, || self.feed.get_bars(ticker, start, now))?;
        check_ordered(ticker, &bars)?;
        let news = self.timed(ticker, || self.feed.get_news(ticker, start, now))?;

        let bars = run.gate.admit(ticker, bars, now)?;
        let news = run.gate.admit(ticker, news, now)?;
        for violation in bars.violations.iter().chain(&news.violations) {
            warn!(%violation, "future-dated item dropped");
            run.warnings.push(violation.to_string());
        }
        Ok((bars.items, news.items))
    }

    /// Run a fetch and discard its result if it overran the soft deadline.
    fn timed<T>(
        &self,
        ticker: &str,
        fetch: impl FnOnce() -> Result<T, DataError>,
    ) -> Result<T, DataError> {
        let started = Instant::now();
        let out = fetch()?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.fetch_timeout_ms {
            return Err(DataError::Timeout {
                ticker: ticker.to_string(),
                timeout_ms: self.config.fetch_timeout_ms,
                elapsed_ms,
            });
        }
        Ok(out)
    }

    fn flow_window(&self) -> Duration {
        Duration::seconds(self.config.flow_window_secs)
    }

    // ─── Post-step risk ─────────────────────────────────────────────

    fn evaluate_kill_switch(&self, run: &mut RunState, now: DateTime<Utc>) {
        if !self.kill_switch.can_trade() {
            return;
        }
        let equity = run.ledger.equity();
        let figures = AccountFigures {
            daily_pnl: equity - run.day_start_equity,
            day_start_equity: run.day_start_equity,
            equity,
            peak_equity: run.peak_equity,
            largest_position_value: run.ledger.largest_position_value(),
            api_error_count: run.errors_today,
            stale_data_age_minutes: run.ledger.stalest_mark_minutes(now),
            daily_trade_count: run.fills_today,
        };
        let state = TradingState::from_account(&figures);
        if let Some(breach) = self.kill_switch.check_and_trigger(&state, now) {
            run.warnings
                .push(format!("kill switch triggered at {now}: {breach}"));
        }
    }
}

/// Convenience wrapper: build an engine for `config` and run once.
pub fn run_backtest(
    feed: Arc<dyn MarketDataFeed>,
    strategy: &mut dyn Strategy,
    tickers: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: EngineConfig,
) -> Result<BacktestResult, EngineError> {
    BacktestEngine::new(feed, config)?.run(strategy, tickers, start, end)
}

fn dedup_tickers(tickers: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tickers
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

fn stop_loss_exit(ledger: &PortfolioLedger, ticker: &str, close: f64) -> Option<Decision> {
    let pos = ledger.position(ticker)?;
    let stop = pos.stop_loss?;
    if close <= stop && pos.shares > 0 {
        Some(Decision::exit(ticker, pos.shares as u64))
    } else {
        None
    }
}

// ─── Run state ──────────────────────────────────────────────────────

/// Mutable state owned by a single run.
struct RunState {
    ledger: PortfolioLedger,
    simulator: ExecutionSimulator,
    gate: PointInTimeGate,
    analyzer: PerformanceAnalyzer,
    flow: BTreeMap<String, TickFlowMeter>,
    flow_fed_until: BTreeMap<String, DateTime<Utc>>,
    rejections: Vec<RejectionRecord>,
    data_errors: Vec<DataErrorRecord>,
    warnings: Vec<String>,
    day: Option<NaiveDate>,
    day_start_equity: f64,
    peak_equity: f64,
    errors_today: u32,
    fills_today: u32,
}

impl RunState {
    fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ledger: PortfolioLedger::new(config.initial_capital),
            simulator: ExecutionSimulator::from_config(config)?,
            gate: PointInTimeGate::new(config.gating),
            analyzer: PerformanceAnalyzer::new(config.periods_per_year),
            flow: BTreeMap::new(),
            flow_fed_until: BTreeMap::new(),
            rejections: Vec::new(),
            data_errors: Vec::new(),
            warnings: Vec::new(),
            day: None,
            day_start_equity: config.initial_capital,
            peak_equity: config.initial_capital,
            errors_today: 0,
            fills_today: 0,
        })
    }

    fn roll_day(&mut self, now: DateTime<Utc>, reset_watchdog: bool) {
        let today = now.date_naive();
        if self.day == Some(today) {
            return;
        }
        self.day = Some(today);
        self.day_start_equity = self.ledger.equity();
        self.errors_today = 0;
        self.fills_today = 0;
        if reset_watchdog {
            self.simulator.watchdog_mut().reset();
        }
    }

    fn record_data_error(&mut self, now: DateTime<Utc>, ticker: &str, err: &DataError) {
        warn!(ticker, %now, error = %err, "data unavailable; ticker skipped this step");
        self.simulator.watchdog_mut().report_error();
        self.errors_today = self.errors_today.saturating_add(1);
        self.data_errors.push(DataErrorRecord {
            timestamp: now,
            ticker: ticker.to_string(),
            message: err.to_string(),
        });
    }

    /// Feed bars not seen before into the ticker's flow meter as pseudo-ticks
    /// and return the net flow over `window`.
    fn update_flow(
        &mut self,
        ticker: &str,
        bars: &[Bar],
        now: DateTime<Utc>,
        window: Duration,
    ) -> f64 {
        let meter = self.flow.entry(ticker.to_string()).or_default();
        let fed_until = self.flow_fed_until.get(ticker).copied();
        for bar in bars
            .iter()
            .filter(|b| fed_until.map_or(true, |t| b.timestamp > t))
        {
            if let Err(e) = meter.add_tick(bar.timestamp, bar.close, bar.volume, bar.is_up()) {
                debug!(ticker, error = %e, "bar not usable as flow tick");
            }
        }
        if let Some(last) = bars.last() {
            self.flow_fed_until.insert(ticker.to_string(), last.timestamp);
        }
        meter.cleanup(now, window);
        meter.get_flow(window, now)
    }

    fn execute(&mut self, decision: &Decision, market: &MarketSnapshot<'_>, kill_switch: &KillSwitch) {
        match self
            .simulator
            .execute(decision, market, &mut self.ledger, kill_switch)
        {
            Ok(Some(_)) => self.fills_today = self.fills_today.saturating_add(1),
            Ok(None) => {}
            Err(rejection) => {
                debug!(
                    ticker = %decision.ticker,
                    action = ?decision.action,
                    kind = rejection.kind(),
                    reason = %rejection,
                    "order rejected"
                );
                self.rejections.push(RejectionRecord {
                    timestamp: market.timestamp,
                    ticker: decision.ticker.clone(),
                    action: decision.action,
                    kind: rejection.kind().to_string(),
                    message: rejection.to_string(),
                });
            }
        }
    }

    fn finish(
        self,
        strategy: &str,
        steps: u64,
        kill_switch: &KillSwitch,
        cancelled: bool,
    ) -> BacktestResult {
        let report = self
            .analyzer
            .analyze(self.ledger.equity_curve(), self.ledger.closed_trades());
        let summary = self.ledger.get_summary();
        BacktestResult {
            run_id: None,
            strategy: strategy.to_string(),
            initial_capital: summary.initial_capital,
            final_equity: summary.equity,
            total_return: report.total_return,
            sharpe_ratio: report.sharpe_ratio,
            sortino_ratio: report.sortino_ratio,
            max_drawdown: report.max_drawdown,
            volatility: report.volatility,
            win_rate: report.win_rate,
            profit_factor: report.profit_factor,
            total_trades: summary.trade_count,
            total_commission: summary.total_commission,
            equity_curve: self.ledger.equity_curve().to_vec(),
            trade_log: self.ledger.trade_log().to_vec(),
            closed_trades: self.ledger.closed_trades().to_vec(),
            rejections: self.rejections,
            data_errors: self.data_errors,
            warnings: self.warnings,
            steps,
            kill_switch: kill_switch.status(),
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryFeed;
    use crate::engine::strategy::{HoldStrategy, ScriptedStrategy};
    use crate::risk::{KillReason, KillSwitchConfig};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn day(i: i64) -> DateTime<Utc> {
        t0() + Duration::days(i)
    }

    fn feed_with(closes: &[f64]) -> Arc<dyn MarketDataFeed> {
        let mut feed = InMemoryFeed::new();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::flat("TEST", day(i as i64), c, 1_000.0))
            .collect();
        feed.insert_bars("TEST", bars).unwrap();
        Arc::new(feed)
    }

    fn frictionless() -> EngineConfig {
        EngineConfig::new(100_000.0).with_costs(0.0, 0.0)
    }

    #[test]
    fn hold_keeps_capital_flat() {
        let engine = BacktestEngine::new(feed_with(&[100.0, 101.0, 99.0]), frictionless()).unwrap();
        let result = engine
            .run(&mut HoldStrategy, &["TEST".into()], day(0), day(2))
            .unwrap();
        assert_eq!(result.equity_curve.len(), 3);
        assert!(result.equity_values().iter().all(|&e| e == 100_000.0));
        assert_eq!(result.total_trades, 0);
    }

    #[test]
    fn duplicate_tickers_trade_once() {
        let engine = BacktestEngine::new(feed_with(&[100.0, 100.0]), frictionless()).unwrap();
        let mut strategy = ScriptedStrategy::new().on(day(0).date_naive(), Decision::buy("TEST", 0.1));
        let result = engine
            .run(&mut strategy, &["TEST".into(), "TEST".into()], day(0), day(1))
            .unwrap();
        assert_eq!(result.total_trades, 1);
    }

    #[test]
    fn empty_universe_is_config_error() {
        let engine = BacktestEngine::new(feed_with(&[100.0]), frictionless()).unwrap();
        assert!(matches!(
            engine.run(&mut HoldStrategy, &[], day(0), day(0)),
            Err(EngineError::Config(ConfigError::EmptyUniverse))
        ));
    }

    #[test]
    fn missing_ticker_is_recorded_not_fatal() {
        let engine = BacktestEngine::new(feed_with(&[100.0, 100.0]), frictionless()).unwrap();
        let result = engine
            .run(&mut HoldStrategy, &["TEST".into(), "NOPE".into()], day(0), day(1))
            .unwrap();
        assert_eq!(result.data_errors.len(), 2);
        assert!(result.data_errors.iter().all(|e| e.ticker == "NOPE"));
        assert_eq!(result.equity_curve.len(), 2);
    }

    #[test]
    fn steps_without_fresh_bars_are_skipped() {
        // Bars every other day, clock every day.
        let mut feed = InMemoryFeed::new();
        feed.insert_bars(
            "TEST",
            vec![Bar::flat("TEST", day(0), 100.0, 1.0), Bar::flat("TEST", day(2), 100.0, 1.0)],
        )
        .unwrap();
        let mut strategy = CountingStrategy::default();
        let engine = BacktestEngine::new(Arc::new(feed), frictionless()).unwrap();
        let result = engine
            .run(&mut strategy, &["TEST".into()], day(0), day(3))
            .unwrap();
        assert_eq!(strategy.calls, 2);
        assert_eq!(result.steps, 4);
        assert!(result.data_errors.is_empty());
    }

    #[test]
    fn halted_switch_rejects_orders() {
        let engine = BacktestEngine::new(feed_with(&[100.0, 100.0]), frictionless()).unwrap();
        engine.kill_switch().trigger(KillReason::Manual, "pre-run halt");
        let mut strategy = ScriptedStrategy::new().on(day(0).date_naive(), Decision::buy("TEST", 0.1));
        let result = engine
            .run(&mut strategy, &["TEST".into()], day(0), day(1))
            .unwrap();
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.rejections[0].kind, "TRADING_HALTED");
        assert!(result.halted());
    }

    #[test]
    fn drawdown_breach_halts_mid_run() {
        let config = EngineConfig {
            kill_switch: KillSwitchConfig {
                max_drawdown_pct: 5.0,
                max_daily_loss_pct: 50.0,
                max_position_concentration: 1.0,
                ..KillSwitchConfig::default()
            },
            ..frictionless()
        };
        let engine = BacktestEngine::new(feed_with(&[100.0, 50.0, 50.0, 50.0]), config).unwrap();
        let mut strategy = ScriptedStrategy::new()
            .on(day(0).date_naive(), Decision::buy("TEST", 0.5))
            .on(day(2).date_naive(), Decision::buy("TEST", 0.1));
        let result = engine
            .run(&mut strategy, &["TEST".into()], day(0), day(3))
            .unwrap();
        assert_eq!(result.kill_switch.trigger_reason, Some(KillReason::Drawdown));
        assert_eq!(result.total_trades, 1);
        assert!(result.rejections.iter().any(|r| r.kind == "TRADING_HALTED"));
    }

    #[test]
    fn stop_loss_exits_before_strategy() {
        let engine =
            BacktestEngine::new(feed_with(&[100.0, 95.0, 89.0, 90.0]), frictionless()).unwrap();
        let mut strategy = ScriptedStrategy::new()
            .on(day(0).date_naive(), Decision::buy("TEST", 0.1).with_stop_loss(90.0));
        let result = engine
            .run(&mut strategy, &["TEST".into()], day(0), day(3))
            .unwrap();
        assert_eq!(result.total_trades, 2);
        assert_eq!(result.closed_trades.len(), 1);
        assert_eq!(result.closed_trades[0].exit_price, 89.0);
    }

    #[test]
    fn cancelled_run_returns_partial_result() {
        let token = CancellationToken::new();
        token.cancel();
        let engine = BacktestEngine::new(feed_with(&[100.0, 100.0]), frictionless())
            .unwrap()
            .with_cancellation(token);
        let result = engine
            .run(&mut HoldStrategy, &["TEST".into()], day(0), day(1))
            .unwrap();
        assert!(result.cancelled);
        assert!(result.equity_curve.is_empty());
    }

    #[derive(Default)]
    struct CountingStrategy {
        calls: usize,
    }

    impl Strategy for CountingStrategy {
        fn name(&self) -> &str {
            "counting"
        }

        fn decide(&mut self, ticker: &str, _ctx: &StrategyContext<'_>) -> Decision {
            self.calls += 1;
            Decision::hold(ticker)
        }
    }
}
