//! TradeGuard CLI: run, sweep and risk-check commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file and save artifacts
//! - `sweep`: run a cost/sizing grid over one config in parallel
//! - `risk check`: evaluate a trading-state snapshot against the configured
//!   kill-switch thresholds; exits non-zero on breach

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tradeguard_core::data::GatingPolicy;
use tradeguard_core::risk::TradingState;
use tradeguard_runner::export::{save_artifacts, save_sweep};
use tradeguard_runner::{
    run_from_config, DataConfig, ParamGrid, ParamSweep, RunConfig, RunReport, SweepResults,
    SyntheticConfig,
};

/// Exit code for `risk check` when a threshold is breached.
const EXIT_BREACH: i32 = 2;

#[derive(Parser)]
#[command(
    name = "tradeguard",
    about = "TradeGuard CLI: point-in-time backtesting with execution risk controls"
)]
struct Cli {
    /// Log filter (e.g. info, debug, tradeguard_core=trace). RUST_LOG wins
    /// when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Treat any future-dated data as fatal, whatever the config says.
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Replace the configured data with a seeded synthetic series.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Run a parameter grid over one config.
    Sweep {
        /// Path to a TOML config file (the base of the grid).
        #[arg(long)]
        config: PathBuf,

        /// Slippage values in bps, comma separated.
        #[arg(long, value_delimiter = ',')]
        slippage_bps: Vec<f64>,

        /// Commission rates as fractions of notional, comma separated.
        #[arg(long, value_delimiter = ',')]
        commission_rate: Vec<f64>,

        /// Position sizes as fractions of equity, comma separated.
        #[arg(long, value_delimiter = ',')]
        position_size: Vec<f64>,

        /// Run grid points one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Output directory for sweep.json / sweep.csv.
        #[arg(long, default_value = "results/sweep")]
        output_dir: PathBuf,
    },
    /// Kill-switch tooling.
    Risk {
        #[command(subcommand)]
        action: RiskAction,
    },
}

#[derive(Subcommand)]
enum RiskAction {
    /// Evaluate a TradingState JSON snapshot against the config's thresholds.
    Check {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// TradingState as a JSON file path or an inline JSON object.
        #[arg(long)]
        state: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            strict,
            synthetic,
        } => run_cmd(&config, &output_dir, strict, synthetic),
        Commands::Sweep {
            config,
            slippage_bps,
            commission_rate,
            position_size,
            sequential,
            output_dir,
        } => {
            let grid = ParamGrid {
                slippage_bps,
                commission_rates: commission_rate,
                position_sizes: position_size,
            };
            sweep_cmd(&config, &grid, sequential, &output_dir)
        }
        Commands::Risk { action } => match action {
            RiskAction::Check { config, state } => {
                let breached = risk_check_cmd(&config, &state)?;
                if breached {
                    std::process::exit(EXIT_BREACH);
                }
                Ok(())
            }
        },
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| anyhow::anyhow!("invalid log filter: {err}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_cmd(config_path: &Path, output_dir: &Path, strict: bool, synthetic: bool) -> Result<()> {
    let mut config = RunConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if strict {
        config.backtest.gating = GatingPolicy::Strict;
    }
    if synthetic && !matches!(config.data, DataConfig::Synthetic(_)) {
        config.data = DataConfig::Synthetic(SyntheticConfig::default());
    }
    config.validate()?;

    let report = run_from_config(&config)?;
    print_summary(&report);

    let run_dir = save_artifacts(&report, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn sweep_cmd(config_path: &Path, grid: &ParamGrid, sequential: bool, output_dir: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(points = grid.size(), "running sweep");

    let results = ParamSweep::new()
        .with_parallelism(!sequential)
        .sweep(grid, &config)?;
    print_sweep(&results);

    let csv_path = save_sweep(&results, output_dir)?;
    println!("Sweep saved to: {}", csv_path.display());
    Ok(())
}

/// Returns true when a threshold is breached.
fn risk_check_cmd(config_path: &Path, state_arg: &str) -> Result<bool> {
    let config = RunConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let json = if Path::new(state_arg).is_file() {
        std::fs::read_to_string(state_arg).with_context(|| format!("reading {state_arg}"))?
    } else {
        state_arg.to_string()
    };
    let state: TradingState =
        serde_json::from_str(&json).context("state is not a valid TradingState JSON object")?;

    match config.kill_switch.evaluate(&state) {
        Some(breach) => {
            println!("BREACH: {breach}");
            Ok(true)
        }
        None => {
            println!("OK: all thresholds within limits");
            Ok(false)
        }
    }
}

fn print_summary(report: &RunReport) {
    let r = &report.result;
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", report.run_id);
    println!("Strategy:       {}", r.strategy);
    println!(
        "Period:         {} to {}",
        report.config.backtest.start_date, report.config.backtest.end_date
    );
    println!("Tickers:        {}", report.config.backtest.tickers.join(", "));
    println!("Steps:          {}", r.steps);
    println!("Fills:          {}", r.total_trades);
    println!("Rejections:     {}", r.rejections.len());
    println!("Data errors:    {}", r.data_errors.len());
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.2}", r.final_equity);
    println!("Total Return:   {:.2}%", r.total_return * 100.0);
    println!("Sharpe:         {:.3}", r.sharpe_ratio);
    println!("Sortino:        {:.3}", r.sortino_ratio);
    println!("Volatility:     {:.2}%", r.volatility * 100.0);
    println!("Max Drawdown:   {:.2}%", r.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", r.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", r.profit_factor);
    println!("Commission:     {:.2}", r.total_commission);
    if r.halted() {
        println!();
        println!(
            "KILL SWITCH:    halted at {} ({})",
            r.kill_switch
                .triggered_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            r.kill_switch.details.as_deref().unwrap_or("no details")
        );
    }
    if r.cancelled {
        println!("WARNING: run was cancelled; results are partial");
    }
    if report.is_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for warn in &r.warnings {
        println!("WARNING: {warn}");
    }
}

fn print_sweep(results: &SweepResults) {
    println!();
    println!(
        "{:<14} {:>9} {:>10} {:>8} {:>12} {:>9} {:>8} {:>7}",
        "run", "slip_bps", "comm", "size", "final_eq", "return%", "sharpe", "halted"
    );
    for e in &results.entries {
        let r = &e.result;
        println!(
            "{:<14} {:>9.2} {:>10.5} {:>8} {:>12.2} {:>9.2} {:>8.3} {:>7}",
            e.run_id.chars().take(12).collect::<String>(),
            e.point.slippage_bps,
            e.point.commission_rate,
            e.point
                .position_size
                .map(|p| format!("{p:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            r.final_equity,
            r.total_return * 100.0,
            r.sharpe_ratio,
            r.halted()
        );
    }
    if let Some(best) = results.best_by_sharpe() {
        println!();
        println!(
            "Best Sharpe: {} ({:.3})",
            best.run_id.chars().take(12).collect::<String>(),
            best.result.sharpe_ratio
        );
    }
}
