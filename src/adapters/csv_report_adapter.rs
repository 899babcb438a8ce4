//! CSV report adapter implementing ReportPort.
//!
//! One table per file: the per-bar timeline, the trade log, the sweep summary
//! and the divergence events of a spread analysis.

use std::path::Path;

use crate::domain::analysis::DivergenceEvent;
use crate::domain::error::PairtraderError;
use crate::domain::position::Trade;
use crate::domain::sweep::SweepRow;
use crate::domain::timeline::Timeline;
use crate::ports::report_port::ReportPort;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TIMELINE_HEADER: [&str; 15] = [
    "timestamp", "price_a", "price_b", "signal", "is_entry", "is_exit", "qty_a", "qty_b",
    "pnl_a", "pnl_b", "funding_a", "funding_b", "fee", "equity", "forced",
];

pub const TRADES_HEADER: [&str; 13] = [
    "entry_time", "exit_time", "direction", "pnl_a", "pnl_b", "funding_a", "funding_b",
    "fees", "total_pnl", "capital_at_entry", "return_pct", "hold_hours", "forced",
];

pub const SWEEP_HEADER: [&str; 9] = [
    "frequency", "trades", "net_pnl", "final_return_pct", "sharpe", "min_drawdown_pct",
    "win_rate_pct", "trades_per_year", "avg_hold_hours",
];

pub const EVENTS_HEADER: [&str; 8] = [
    "timestamp", "side", "entry_z", "converged", "converged_at", "converged_z",
    "hours_to_converge", "max_excursion",
];

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_table<I>(&self, output_path: &str, header: &[&str], rows: I) -> Result<(), PairtraderError>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut wtr = csv::Writer::from_path(path).map_err(|e| write_error(output_path, e))?;
        wtr.write_record(header).map_err(|e| write_error(output_path, e))?;
        let mut count = 0usize;
        for row in rows {
            wtr.write_record(&row).map_err(|e| write_error(output_path, e))?;
            count += 1;
        }
        wtr.flush()?;

        tracing::info!(path = output_path, rows = count, "wrote report");
        Ok(())
    }
}

fn write_error(path: &str, err: csv::Error) -> PairtraderError {
    PairtraderError::Io(std::io::Error::other(format!("failed to write {path}: {err}")))
}

fn flag(value: bool) -> String {
    String::from(if value { "1" } else { "0" })
}

impl ReportPort for CsvReportAdapter {
    fn write_timeline(&self, timeline: &Timeline, output_path: &str) -> Result<(), PairtraderError> {
        let rows = timeline.iter().map(|s| {
            vec![
                s.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                s.price_a.to_string(),
                s.price_b.to_string(),
                s.signal.to_string(),
                flag(s.is_entry),
                flag(s.is_exit),
                s.qty_a.to_string(),
                s.qty_b.to_string(),
                s.pnl_a.to_string(),
                s.pnl_b.to_string(),
                s.funding_a.to_string(),
                s.funding_b.to_string(),
                s.fee.to_string(),
                s.equity.map(|e| e.to_string()).unwrap_or_default(),
                flag(s.forced),
            ]
        });
        self.write_table(output_path, &TIMELINE_HEADER, rows)
    }

    fn write_trades(&self, trades: &[Trade], output_path: &str) -> Result<(), PairtraderError> {
        let rows = trades.iter().map(|t| {
            vec![
                t.entry_time.format(TIMESTAMP_FORMAT).to_string(),
                t.exit_time.format(TIMESTAMP_FORMAT).to_string(),
                t.direction.to_string(),
                t.pnl_a.to_string(),
                t.pnl_b.to_string(),
                t.funding_a.to_string(),
                t.funding_b.to_string(),
                t.fees.to_string(),
                t.total_pnl.to_string(),
                t.capital_at_entry.to_string(),
                (t.return_frac * 100.0).to_string(),
                t.hold_hours().to_string(),
                flag(t.forced),
            ]
        });
        self.write_table(output_path, &TRADES_HEADER, rows)
    }

    fn write_sweep(&self, rows: &[SweepRow], output_path: &str) -> Result<(), PairtraderError> {
        let records = rows.iter().map(|r| {
            let m = &r.metrics;
            vec![
                r.frequency.to_string(),
                m.trade_count.to_string(),
                format!("{:.6}", m.net_pnl),
                format!("{:.4}", m.final_return_pct),
                format!("{:.4}", m.sharpe),
                format!("{:.4}", m.min_drawdown),
                format!("{:.2}", m.win_rate),
                format!("{:.2}", m.trades_per_year),
                format!("{:.2}", m.avg_hold_hours),
            ]
        });
        self.write_table(output_path, &SWEEP_HEADER, records)
    }

    fn write_events(
        &self,
        events: &[DivergenceEvent],
        output_path: &str,
    ) -> Result<(), PairtraderError> {
        let rows = events.iter().map(|e| {
            let c = e.convergence.as_ref();
            vec![
                e.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                String::from(if e.is_above() { "above" } else { "below" }),
                format!("{:.4}", e.entry_z),
                flag(e.converged()),
                c.map(|c| c.timestamp.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_default(),
                c.map(|c| format!("{:.4}", c.z)).unwrap_or_default(),
                c.map(|c| format!("{:.2}", c.hours)).unwrap_or_default(),
                format!("{:.4}", e.max_excursion),
            ]
        });
        self.write_table(output_path, &EVENTS_HEADER, rows)
    }
}
