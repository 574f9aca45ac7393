//! Criterion benchmarks for hot paths.
//!
//! 1. Full backtest loop (one ticker, daily steps)
//! 2. TickFlowMeter ingestion with pruning
//! 3. Ledger fill throughput

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tradeguard_core::data::InMemoryFeed;
use tradeguard_core::domain::{Bar, Decision, OrderSide};
use tradeguard_core::engine::{BacktestEngine, Strategy, StrategyContext};
use tradeguard_core::execution::TickFlowMeter;
use tradeguard_core::ledger::PortfolioLedger;
use tradeguard_core::EngineConfig;

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap()
}

fn make_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar {
                ticker: "SPY".into(),
                timestamp: t0() + Duration::days(i as i64),
                open,
                high: close + 1.5,
                low: open - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64,
            }
        })
        .collect()
}

struct SmaCross;

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision {
        match (ctx.sma(10), ctx.sma(30)) {
            (Some(fast), Some(slow)) if fast > slow && ctx.shares_held() == 0 => {
                Decision::buy(ticker, 0.25)
            }
            (Some(fast), Some(slow)) if fast < slow && ctx.shares_held() > 0 => {
                Decision::exit(ticker, ctx.shares_held() as u64)
            }
            _ => Decision::hold(ticker),
        }
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtest_loop");
    for &n in &[252usize, 1_260] {
        let mut feed = InMemoryFeed::new();
        feed.insert_bars("SPY", make_bars(n)).unwrap();
        let feed = Arc::new(feed);
        let config = EngineConfig::new(100_000.0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let engine = BacktestEngine::new(feed.clone(), config.clone()).unwrap();
                let result = engine
                    .run(
                        &mut SmaCross,
                        &["SPY".to_string()],
                        t0(),
                        t0() + Duration::days(n as i64 - 1),
                    )
                    .unwrap();
                black_box(result.final_equity)
            })
        });
    }
    group.finish();
}

fn bench_tick_flow(c: &mut Criterion) {
    c.bench_function("tick_flow_ingest_100k", |b| {
        b.iter(|| {
            let mut meter = TickFlowMeter::with_capacity(10_000);
            let mut now = t0();
            for i in 0..100_000i64 {
                now = t0() + Duration::milliseconds(i * 10);
                meter.add_tick(now, 100.0, 10.0, i % 3 != 0).unwrap();
                if i % 1_000 == 0 {
                    meter.cleanup(now, Duration::seconds(30));
                }
            }
            black_box(meter.get_flow(Duration::seconds(10), now))
        })
    });
}

fn bench_ledger(c: &mut Criterion) {
    c.bench_function("ledger_10k_round_trips", |b| {
        b.iter(|| {
            let mut ledger = PortfolioLedger::new(1_000_000.0);
            for i in 0..10_000 {
                let at = t0() + Duration::minutes(i);
                let side = if i % 2 == 0 { OrderSide::Buy } else { OrderSide::Sell };
                let order = ledger.create_order("SPY", side, 10, 100.0, at);
                ledger.fill_order(&order, 100.0, 0.5, at).unwrap();
            }
            black_box(ledger.get_summary())
        })
    });
}

criterion_group!(benches, bench_backtest, bench_tick_flow, bench_ledger);
criterion_main!(benches);
