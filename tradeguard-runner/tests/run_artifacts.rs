//! Integration tests for the runner: TOML file → CSV data → run → artifacts.

use std::path::Path;

use tradeguard_core::risk::{KillReason, KillSwitch};
use tradeguard_runner::export::{load_artifacts, save_artifacts};
use tradeguard_runner::{run_from_config, DataConfig, RunConfig, OVERRIDE_CODE_ENV};

const BARS: &str = "date,open,high,low,close,volume\n\
    2024-01-02,100,100,100,100,1000\n\
    2024-01-03,101,101,101,101,1000\n\
    2024-01-04,102,102,102,102,1000\n\
    2024-01-05,103,103,103,103,1000\n";

const CONFIG: &str = r#"
[backtest]
tickers = ["SPY"]
start_date = "2024-01-02"
end_date = "2024-01-05"
initial_capital = 100000.0

[costs]
slippage_bps = 0.0
commission_rate = 0.0

[kill_switch]
override_code = "let-me-trade"

[strategy]
type = "scheduled"

[[strategy.orders]]
date = "2024-01-02"
ticker = "SPY"
action = "BUY"
quantity = 100

[[strategy.orders]]
date = "2024-01-04"
ticker = "SPY"
action = "SELL"
quantity = 100

[data]
source = "csv"
dir = "bars"
"#;

fn write_fixture(root: &Path, config: &str) -> std::path::PathBuf {
    let bars_dir = root.join("bars");
    std::fs::create_dir_all(&bars_dir).unwrap();
    std::fs::write(bars_dir.join("SPY.csv"), BARS).unwrap();
    let config_path = root.join("run.toml");
    std::fs::write(&config_path, config).unwrap();
    config_path
}

#[test]
fn relative_data_dir_resolves_against_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), CONFIG);
    let config = RunConfig::from_file(&path).unwrap();
    match &config.data {
        DataConfig::Csv { dir: data_dir } => assert_eq!(data_dir, &dir.path().join("bars")),
        other => panic!("expected csv data, got {other:?}"),
    }
}

#[test]
fn scheduled_round_trip_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::from_file(&write_fixture(dir.path(), CONFIG)).unwrap();
    let report = run_from_config(&config).unwrap();
    let r = &report.result;

    assert!(!report.is_synthetic());
    assert_eq!(r.trade_log.len(), 2);
    assert_eq!(r.closed_trades.len(), 1);
    assert!((r.closed_trades[0].realized_pnl - 200.0).abs() < 1e-9);
    assert!((r.final_equity - 100_200.0).abs() < 1e-9);
    assert!((r.total_return - 0.002).abs() < 1e-12);
    assert_eq!(r.win_rate, 1.0);
    assert_eq!(r.equity_values(), vec![100_000.0, 100_100.0, 100_200.0, 100_200.0]);
    assert!(r.rejections.is_empty());
    assert!(!r.halted());
}

#[test]
fn artifacts_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::from_file(&write_fixture(dir.path(), CONFIG)).unwrap();
    let report = run_from_config(&config).unwrap();

    let out = dir.path().join("results");
    let run_dir = save_artifacts(&report, &out).unwrap();
    assert!(run_dir.starts_with(&out));
    for name in ["result.json", "equity.csv", "trades.csv", "closed_trades.csv"] {
        assert!(run_dir.join(name).exists(), "{name} missing");
    }

    let trades = std::fs::read_to_string(run_dir.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), 3);
    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    assert_eq!(equity.lines().count(), 5);

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.run_id, report.run_id);
    assert_eq!(loaded.result, report.result);
    // The override code is never written out.
    let json = std::fs::read_to_string(run_dir.join("result.json")).unwrap();
    assert!(!json.contains("let-me-trade"));
    assert!(loaded.config.kill_switch.override_code.is_none());
}

#[test]
fn newer_schema_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::from_file(&write_fixture(dir.path(), CONFIG)).unwrap();
    let report = run_from_config(&config).unwrap();
    let run_dir = save_artifacts(&report, &dir.path().join("results")).unwrap();

    let path = run_dir.join("result.json");
    let json = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, json.replace("\"schema_version\": 1", "\"schema_version\": 99")).unwrap();
    let err = load_artifacts(&run_dir).unwrap_err();
    assert!(err.to_string().contains("unsupported schema version"));
}

#[test]
fn override_code_falls_back_to_environment() {
    let dir = tempfile::tempdir().unwrap();
    let without_code = CONFIG.replace("override_code = \"let-me-trade\"", "");
    std::env::set_var(OVERRIDE_CODE_ENV, "from-env");
    let config = RunConfig::from_file(&write_fixture(dir.path(), &without_code)).unwrap();
    std::env::remove_var(OVERRIDE_CODE_ENV);

    let switch = KillSwitch::new(config.kill_switch.clone()).unwrap();
    switch.trigger(KillReason::Manual, "operator test");
    assert!(switch.deactivate("wrong", "nope").is_err());
    assert!(switch.deactivate("from-env", "resume").is_ok());
    assert!(switch.can_trade());
}

#[test]
fn missing_ticker_file_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config_text = CONFIG.replace(r#"tickers = ["SPY"]"#, r#"tickers = ["SPY", "QQQ"]"#);
    let config = RunConfig::from_file(&write_fixture(dir.path(), &config_text)).unwrap();
    let err = run_from_config(&config).unwrap_err();
    assert!(err.to_string().contains("QQQ"));
}

#[test]
fn bundled_sample_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("configs/synthetic_crossover.toml");
    let config = RunConfig::from_file(&path).unwrap();
    assert_eq!(config.backtest.tickers.len(), 3);
    assert_eq!(config.strategy.name(), "ma_crossover");
    assert!(matches!(config.data, DataConfig::Synthetic(_)));
}
