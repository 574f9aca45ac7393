//! Rule-based strategy presets selectable from `[strategy]`.

use std::collections::BTreeSet;

use tradeguard_core::domain::{Action, Decision};
use tradeguard_core::engine::ScriptedStrategy;
use tradeguard_core::{Strategy, StrategyContext};

use crate::config::{ScheduledOrder, StrategyConfig};

/// Build the strategy a config names.
pub fn build_strategy(config: &StrategyConfig) -> Box<dyn Strategy> {
    match config {
        StrategyConfig::BuyAndHold { position_size } => Box::new(BuyAndHold::new(*position_size)),
        StrategyConfig::MaCrossover {
            short_period,
            long_period,
            position_size,
            stop_loss_pct,
        } => Box::new(MaCrossover {
            short_period: *short_period,
            long_period: *long_period,
            position_size: *position_size,
            stop_loss_pct: *stop_loss_pct,
        }),
        StrategyConfig::Scheduled { orders } => Box::new(Scheduled::new(orders)),
    }
}

/// One entry attempt per ticker on its first visible bar, then hold.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    position_size: f64,
    entered: BTreeSet<String>,
}

impl BuyAndHold {
    pub fn new(position_size: f64) -> Self {
        Self {
            position_size,
            entered: BTreeSet::new(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision {
        if ctx.latest_bar().is_none() || !self.entered.insert(ticker.to_string()) {
            return Decision::hold(ticker);
        }
        Decision::buy(ticker, self.position_size)
    }
}

/// Long while SMA(short) > SMA(long); full exit when it crosses back under.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub short_period: usize,
    pub long_period: usize,
    pub position_size: f64,
    pub stop_loss_pct: Option<f64>,
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision {
        let (Some(fast), Some(slow), Some(close)) = (
            ctx.sma(self.short_period),
            ctx.sma(self.long_period),
            ctx.latest_close(),
        ) else {
            return Decision::hold(ticker);
        };

        let held = ctx.shares_held();
        if fast > slow && held == 0 {
            let decision = Decision::buy(ticker, self.position_size);
            return match self.stop_loss_pct {
                Some(pct) => decision.with_stop_loss(close * (1.0 - pct)),
                None => decision,
            };
        }
        if fast < slow && held > 0 {
            return Decision::exit(ticker, held.unsigned_abs());
        }
        Decision::hold(ticker)
    }
}

/// Fixed orders keyed by ticker and date.
#[derive(Debug, Clone)]
pub struct Scheduled {
    script: ScriptedStrategy,
}

impl Scheduled {
    pub fn new(orders: &[ScheduledOrder]) -> Self {
        let script = orders
            .iter()
            .fold(ScriptedStrategy::new(), |script, order| {
                script.on(order.date, scheduled_decision(order))
            });
        Self { script }
    }
}

fn scheduled_decision(order: &ScheduledOrder) -> Decision {
    let mut decision = match order.action {
        Action::Buy => Decision::buy(&order.ticker, order.position_size),
        Action::Sell => Decision::sell(&order.ticker, order.position_size),
        Action::Hold => return Decision::hold(&order.ticker),
    };
    decision.quantity = order.quantity;
    decision.stop_loss = order.stop_loss;
    decision
}

impl Strategy for Scheduled {
    fn name(&self) -> &str {
        "scheduled"
    }

    fn decide(&mut self, ticker: &str, ctx: &StrategyContext<'_>) -> Decision {
        self.script.decide(ticker, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use tradeguard_core::domain::{Bar, Position};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::flat("SPY", t0() + Duration::days(i as i64), c, 1.0))
            .collect()
    }

    fn ctx<'a>(bars: &'a [Bar], position: Option<&'a Position>) -> StrategyContext<'a> {
        StrategyContext {
            ticker: "SPY",
            as_of: bars.last().map_or(t0(), |b| b.timestamp),
            bars,
            news: &[],
            position,
            cash: 100_000.0,
            equity: 100_000.0,
            net_flow: 0.0,
        }
    }

    fn held(shares: i64) -> Position {
        Position {
            shares,
            avg_cost: 100.0,
            ..Position::new("SPY")
        }
    }

    #[test]
    fn buy_and_hold_enters_once_per_ticker() {
        let mut s = BuyAndHold::new(0.5);
        let b = bars(&[100.0]);
        assert_eq!(s.decide("SPY", &ctx(&b, None)).action, Action::Buy);
        assert!(s.decide("SPY", &ctx(&b, None)).is_hold());
        assert_eq!(s.decide("QQQ", &ctx(&b, None)).action, Action::Buy);
    }

    #[test]
    fn buy_and_hold_waits_for_a_bar() {
        let mut s = BuyAndHold::new(0.5);
        assert!(s.decide("SPY", &ctx(&[], None)).is_hold());
        let b = bars(&[100.0]);
        assert_eq!(s.decide("SPY", &ctx(&b, None)).action, Action::Buy);
    }

    #[test]
    fn crossover_holds_during_warmup() {
        let mut s = MaCrossover {
            short_period: 2,
            long_period: 4,
            position_size: 0.2,
            stop_loss_pct: None,
        };
        let b = bars(&[1.0, 2.0, 3.0]);
        assert!(s.decide("SPY", &ctx(&b, None)).is_hold());
    }

    #[test]
    fn crossover_enters_with_stop_and_exits_fully() {
        let mut s = MaCrossover {
            short_period: 2,
            long_period: 4,
            position_size: 0.2,
            stop_loss_pct: Some(0.1),
        };
        let rising = bars(&[10.0, 10.0, 12.0, 14.0]);
        let d = s.decide("SPY", &ctx(&rising, None));
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.position_size_pct, 0.2);
        assert!((d.stop_loss.unwrap() - 12.6).abs() < 1e-9);

        let pos = held(30);
        assert!(s.decide("SPY", &ctx(&rising, Some(&pos))).is_hold());

        let falling = bars(&[14.0, 14.0, 12.0, 10.0]);
        let d = s.decide("SPY", &ctx(&falling, Some(&pos)));
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.quantity, Some(30));
    }

    #[test]
    fn scheduled_carries_quantity_and_stop() {
        let orders = vec![
            ScheduledOrder {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                ticker: "SPY".into(),
                action: Action::Buy,
                position_size: 0.3,
                quantity: None,
                stop_loss: Some(95.0),
            },
            ScheduledOrder {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                ticker: "SPY".into(),
                action: Action::Sell,
                position_size: 0.1,
                quantity: Some(7),
                stop_loss: None,
            },
        ];
        let mut s = Scheduled::new(&orders);
        let day0 = bars(&[100.0]);
        let d = s.decide("SPY", &ctx(&day0, None));
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.stop_loss, Some(95.0));

        let day1 = bars(&[100.0, 101.0]);
        let d = s.decide("SPY", &ctx(&day1, None));
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.quantity, Some(7));

        let day2 = bars(&[100.0, 101.0, 102.0]);
        assert!(s.decide("SPY", &ctx(&day2, None)).is_hold());
    }

    #[test]
    fn factory_names_match_config() {
        let config = StrategyConfig::MaCrossover {
            short_period: 3,
            long_period: 9,
            position_size: 0.1,
            stop_loss_pct: None,
        };
        assert_eq!(build_strategy(&config).name(), config.name());
        let config = StrategyConfig::BuyAndHold { position_size: 0.1 };
        assert_eq!(build_strategy(&config).name(), config.name());
    }
}
