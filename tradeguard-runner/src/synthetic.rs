//! Seeded random-walk bars for development runs.
//!
//! These are clearly fake. The runner tags results produced on them.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tradeguard_core::domain::Bar;

use crate::config::SyntheticConfig;

/// Daily bars for `ticker` over `[start, end]`, weekends skipped, stamped at
/// midnight UTC.
///
/// The series depends only on `(config, ticker, start, end)`: the RNG is
/// seeded from the config seed mixed with the ticker name, so every ticker
/// gets its own path and reruns are identical.
pub fn generate_bars(
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    config: &SyntheticConfig,
) -> Vec<Bar> {
    let mut rng = ticker_rng(config.seed, ticker);

    let mut bars = Vec::new();
    let mut price = config.start_price;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += Duration::days(1);
            continue;
        }

        let ret = config.drift + config.volatility * standard_normal(&mut rng);
        let open = price;
        // Floor keeps a long negative drift from walking the price to zero.
        let close = (price * (1.0 + ret)).max(0.01);
        let wick = config.volatility * 0.5;
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..=wick));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..=wick));
        let volume = (config.base_volume * rng.gen_range(0.5..1.5)).round();

        bars.push(Bar {
            ticker: ticker.to_string(),
            timestamp: current.and_time(NaiveTime::MIN).and_utc(),
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += Duration::days(1);
    }

    bars
}

fn ticker_rng(seed: u64, ticker: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(ticker.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
