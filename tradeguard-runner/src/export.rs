//! Artifact export: JSON report plus CSV equity curve and trade tape.
//!
//! Persisted reports carry a `schema_version`; newer versions are rejected
//! on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tradeguard_core::domain::{ClosedTrade, Fill};
use tradeguard_core::ledger::EquityPoint;

use crate::runner::{RunReport, SCHEMA_VERSION};
use crate::sweep::SweepResults;

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a report, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: timestamp, equity
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for point in equity_curve {
        wtr.write_record([point.timestamp.to_rfc3339(), format!("{:.2}", point.equity)])?;
    }
    finish(wtr)
}

/// One row per fill.
///
/// Columns: order_id, timestamp, ticker, side, quantity, executed_price,
/// gross_amount, commission
pub fn export_trades_csv(fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "order_id",
        "timestamp",
        "ticker",
        "side",
        "quantity",
        "executed_price",
        "gross_amount",
        "commission",
    ])?;
    for f in fills {
        wtr.write_record([
            f.order_id.to_string(),
            f.timestamp.to_rfc3339(),
            f.ticker.clone(),
            f.side.to_string(),
            f.quantity.to_string(),
            format!("{:.6}", f.executed_price),
            format!("{:.2}", f.gross_amount()),
            format!("{:.2}", f.commission),
        ])?;
    }
    finish(wtr)
}

/// One row per closing sell.
pub fn export_closed_trades_csv(trades: &[ClosedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "order_id",
        "closed_at",
        "ticker",
        "quantity",
        "avg_cost",
        "exit_price",
        "realized_pnl",
        "commission",
        "net_pnl",
    ])?;
    for t in trades {
        wtr.write_record([
            t.order_id.to_string(),
            t.closed_at.to_rfc3339(),
            t.ticker.clone(),
            t.quantity.to_string(),
            format!("{:.6}", t.avg_cost),
            format!("{:.6}", t.exit_price),
            format!("{:.2}", t.realized_pnl),
            format!("{:.2}", t.commission),
            format!("{:.2}", t.net_pnl()),
        ])?;
    }
    finish(wtr)
}

/// One row per grid point, in grid order.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "run_id",
        "slippage_bps",
        "commission_rate",
        "position_size",
        "final_equity",
        "total_return",
        "sharpe_ratio",
        "max_drawdown",
        "win_rate",
        "total_trades",
        "halted",
    ])?;
    for e in &results.entries {
        let r = &e.result;
        wtr.write_record([
            e.run_id.clone(),
            e.point.slippage_bps.to_string(),
            e.point.commission_rate.to_string(),
            e.point.position_size.map(|p| p.to_string()).unwrap_or_default(),
            format!("{:.2}", r.final_equity),
            format!("{:.6}", r.total_return),
            format!("{:.4}", r.sharpe_ratio),
            format!("{:.6}", r.max_drawdown),
            format!("{:.4}", r.win_rate),
            r.total_trades.to_string(),
            r.halted().to_string(),
        ])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one run.
///
/// Creates `{output_dir}/{run_id prefix}/` containing `result.json`,
/// `equity.csv`, `trades.csv` and `closed_trades.csv`. The directory name is
/// derived from the config fingerprint, so rerunning a config overwrites its
/// own artifacts. Returns the directory path.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = report.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(if prefix.is_empty() { "run".to_string() } else { prefix });
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("result.json"), export_json(report)?)?;
    std::fs::write(
        run_dir.join("equity.csv"),
        export_equity_csv(&report.result.equity_curve)?,
    )?;
    std::fs::write(
        run_dir.join("trades.csv"),
        export_trades_csv(&report.result.trade_log)?,
    )?;
    std::fs::write(
        run_dir.join("closed_trades.csv"),
        export_closed_trades_csv(&report.result.closed_trades)?,
    )?;

    Ok(run_dir)
}

/// Load a report from an artifact directory's `result.json`.
pub fn load_artifacts(run_dir: &Path) -> Result<RunReport> {
    let path = run_dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Write `sweep.json` and `sweep.csv` under `output_dir`.
pub fn save_sweep(results: &SweepResults, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let json = serde_json::to_string_pretty(results).context("failed to serialize sweep")?;
    std::fs::write(output_dir.join("sweep.json"), json)?;
    let csv_path = output_dir.join("sweep.csv");
    std::fs::write(&csv_path, export_sweep_csv(results)?)?;
    Ok(csv_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tradeguard_core::domain::{OrderId, OrderSide};

    fn fill() -> Fill {
        Fill {
            order_id: OrderId(3),
            ticker: "SPY".into(),
            side: OrderSide::Buy,
            executed_price: 100.05,
            quantity: 10,
            commission: 0.5,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn trades_csv_header_and_row() {
        let csv = export_trades_csv(&[fill()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "order_id,timestamp,ticker,side,quantity,executed_price,gross_amount,commission"
        );
        assert_eq!(
            lines.next().unwrap(),
            "O3,2024-01-02T00:00:00+00:00,SPY,BUY,10,100.050000,1000.50,0.50"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn equity_csv_rows() {
        let curve = vec![
            EquityPoint {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                equity: 100_000.0,
            },
            EquityPoint {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
                equity: 100_123.456,
            },
        ];
        let csv = export_equity_csv(&curve).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "2024-01-03T00:00:00+00:00,100123.46");
    }

    #[test]
    fn empty_tape_has_header_only() {
        let csv = export_closed_trades_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
