//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::analysis::{self, AnalysisConfig, AnalysisResult};
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::bar::Bar;
use crate::domain::config_validation::{
    load_analysis_config, load_backtest_config, load_signal_config, load_sweep_config,
    validate_analysis_config, validate_backtest_config, validate_signal_config,
    validate_sweep_config,
};
use crate::domain::error::PairtraderError;
use crate::domain::metrics::{Metrics, compute_stats};
use crate::domain::signal::{SignalConfig, SignalSource, apply_lagged_spread_signal};
use crate::domain::sweep::{self, SweepConfig, SweepRow};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Parser, Debug)]
#[command(name = "pairtrader", about = "Pairs-trading backtester and rebalance sweep")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one backtest and write the timeline and trade log
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar file; overrides [backtest] data
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Rebalance every N bars; overrides [backtest] rebalance_freq
        #[arg(long)]
        freq: Option<usize>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Backtest every rebalance frequency from 1 to max-freq
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(long)]
        max_freq: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Z-score the price spread and report divergence/convergence events
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Events table; defaults to events.csv in the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            freq,
            output_dir,
        } => run_backtest(&config, data.as_ref(), freq, output_dir.as_ref()),
        Command::Sweep {
            config,
            data,
            max_freq,
            workers,
            output,
        } => run_sweep(&config, data.as_ref(), max_freq, workers, output.as_ref()),
        Command::Analyze {
            config,
            data,
            output,
        } => run_analyze(&config, data.as_ref(), output.as_ref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &PairtraderError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PairtraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        fail(&err)
    })
}

/// `[backtest]` settings with an optional command-line frequency override.
pub fn build_backtest_config(
    adapter: &dyn ConfigPort,
    freq_override: Option<usize>,
) -> Result<BacktestConfig, PairtraderError> {
    let config = load_backtest_config(adapter)?;
    match freq_override {
        Some(freq) => {
            let config = config.with_rebalance_freq(freq);
            config.validate()?;
            Ok(config)
        }
        None => Ok(config),
    }
}

pub fn build_sweep_config(
    adapter: &dyn ConfigPort,
    max_freq: Option<usize>,
    workers: Option<usize>,
) -> Result<SweepConfig, PairtraderError> {
    let mut config = load_sweep_config(adapter)?;
    if let Some(max_freq) = max_freq {
        config.max_freq = max_freq;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

/// The command-line path wins; otherwise `[backtest] data`, taken relative to
/// the config file's directory.
pub fn resolve_data_path(
    adapter: &dyn ConfigPort,
    config_path: &Path,
    data_override: Option<&PathBuf>,
) -> Result<PathBuf, PairtraderError> {
    if let Some(path) = data_override {
        return Ok(path.clone());
    }
    let configured = adapter
        .get_string("backtest", "data")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PairtraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data".to_string(),
        })?;

    let path = PathBuf::from(configured);
    if path.is_relative() {
        if let Some(dir) = config_path.parent() {
            return Ok(dir.join(path));
        }
    }
    Ok(path)
}

pub fn resolve_output_dir(adapter: &dyn ConfigPort, dir_override: Option<&PathBuf>) -> PathBuf {
    dir_override.cloned().unwrap_or_else(|| {
        adapter
            .get_string("output", "dir")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    })
}

/// Fetch bars and, for spread-driven configs, derive their lagged signals.
pub fn load_bars(
    data_port: &dyn DataPort,
    signal: &SignalConfig,
    ratio: f64,
) -> Result<Vec<Bar>, PairtraderError> {
    let bars = data_port.fetch_bars()?;
    match signal.source {
        SignalSource::Column => Ok(bars),
        SignalSource::Spread => {
            let derived = apply_lagged_spread_signal(bars, ratio, signal.lag);
            if derived.is_empty() {
                return Err(PairtraderError::Data {
                    reason: format!("series shorter than signal lag {}", signal.lag),
                });
            }
            Ok(derived)
        }
    }
}

/// Run one backtest, summarize it, and write its tables into `output_dir`.
pub fn run_backtest_pipeline(
    bars: &[Bar],
    config: &BacktestConfig,
    report: &dyn ReportPort,
    output_dir: &Path,
) -> Result<(BacktestResult, Metrics), PairtraderError> {
    let result = backtest_engine::run_backtest(bars, config)?;
    let metrics = compute_stats(&result.trades, result.initial_capital, config.risk_free_rate);

    std::fs::create_dir_all(output_dir)?;
    let timeline_path = output_dir.join("timeline.csv");
    let trades_path = output_dir.join("trades.csv");
    report.write_timeline(&result.timeline, &timeline_path.to_string_lossy())?;
    report.write_trades(&result.trades, &trades_path.to_string_lossy())?;

    Ok((result, metrics))
}

/// Analyze the spread of the fetched bars and write the event table.
///
/// Only prices are read, so the signal column may be absent.
pub fn run_analysis_pipeline(
    data_port: &dyn DataPort,
    config: &AnalysisConfig,
    report: &dyn ReportPort,
    output: &Path,
) -> Result<AnalysisResult, PairtraderError> {
    let bars = data_port.fetch_bars()?;
    let result = analysis::analyze(&bars, config)?;
    report.write_events(&result.events, &output.to_string_lossy())?;
    Ok(result)
}

fn print_metrics(metrics: &Metrics) {
    eprintln!("Trades:           {}", metrics.trade_count);
    eprintln!("Net PnL:          {:.4}", metrics.net_pnl);
    eprintln!("Return:           {:.2}%", metrics.final_return_pct);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe);
    eprintln!("Max Drawdown:     {:.2}%", metrics.min_drawdown);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate);
    eprintln!("Trades / Year:    {:.1}", metrics.trades_per_year);
    eprintln!("Avg Hold:         {:.1}h", metrics.avg_hold_hours);
}

fn prepare(
    config_path: &PathBuf,
    data_override: Option<&PathBuf>,
    freq_override: Option<usize>,
) -> Result<(FileConfigAdapter, BacktestConfig, Vec<Bar>), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    let config = build_backtest_config(&adapter, freq_override).map_err(|e| fail(&e))?;
    let signal = load_signal_config(&adapter).map_err(|e| fail(&e))?;
    let data_path = resolve_data_path(&adapter, config_path, data_override).map_err(|e| fail(&e))?;

    eprintln!("Loading bars from {}", data_path.display());
    let data_port =
        CsvAdapter::new(data_path).with_derived_signal(signal.source == SignalSource::Spread);
    let bars = load_bars(&data_port, &signal, config.ratio).map_err(|e| fail(&e))?;
    eprintln!("  {} bars, signal from {}", bars.len(), signal.source);

    Ok((adapter, config, bars))
}

fn run_backtest(
    config_path: &PathBuf,
    data_override: Option<&PathBuf>,
    freq_override: Option<usize>,
    output_dir: Option<&PathBuf>,
) -> ExitCode {
    let (adapter, config, bars) = match prepare(config_path, data_override, freq_override) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let output_dir = resolve_output_dir(&adapter, output_dir);

    eprintln!(
        "Running backtest: ratio {}, fee {}, every {} bars, {} sizing",
        config.ratio, config.fee_rate, config.rebalance_freq, config.sizing
    );
    let report = CsvReportAdapter::new();
    match run_backtest_pipeline(&bars, &config, &report, &output_dir) {
        Ok((result, metrics)) => {
            eprintln!("\n=== Results ===");
            eprintln!("Initial Capital:  {:.4}", result.initial_capital);
            eprintln!("Final Equity:     {:.4}", result.final_equity);
            print_metrics(&metrics);
            eprintln!("\nTables written to: {}", output_dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn best_rows(rows: &[SweepRow], n: usize) -> Vec<&SweepRow> {
    let mut ranked: Vec<&SweepRow> = rows.iter().collect();
    ranked.sort_by(|a, b| b.metrics.sharpe.total_cmp(&a.metrics.sharpe));
    ranked.truncate(n);
    ranked
}

fn run_sweep(
    config_path: &PathBuf,
    data_override: Option<&PathBuf>,
    max_freq: Option<usize>,
    workers: Option<usize>,
    output: Option<&PathBuf>,
) -> ExitCode {
    let (adapter, config, bars) = match prepare(config_path, data_override, None) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let sweep_config = match build_sweep_config(&adapter, max_freq, workers) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let output = output
        .cloned()
        .unwrap_or_else(|| resolve_output_dir(&adapter, None).join("sweep.csv"));

    eprintln!("Sweeping rebalance frequency 1..={}", sweep_config.max_freq);
    let rows = match sweep::run_sweep(&bars, &config, &sweep_config) {
        Ok(rows) => rows,
        Err(e) => return fail(&e),
    };

    eprintln!("\n=== Top Frequencies by Sharpe ===");
    eprintln!("{:>6} {:>8} {:>10} {:>10} {:>10}", "freq", "trades", "return%", "sharpe", "maxdd%");
    for row in best_rows(&rows, 5) {
        let m = &row.metrics;
        eprintln!(
            "{:>6} {:>8} {:>10.2} {:>10.2} {:>10.2}",
            row.frequency, m.trade_count, m.final_return_pct, m.sharpe, m.min_drawdown
        );
    }

    match CsvReportAdapter::new().write_sweep(&rows, &output.to_string_lossy()) {
        Ok(()) => {
            eprintln!("\nSweep written to: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_analyze(
    config_path: &PathBuf,
    data_override: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match load_analysis_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let data_path = match resolve_data_path(&adapter, config_path, data_override) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let output = output
        .cloned()
        .unwrap_or_else(|| resolve_output_dir(&adapter, None).join("events.csv"));

    eprintln!(
        "Analyzing {} spread from {}: window {}, threshold {}, convergence {}",
        config.spread,
        data_path.display(),
        config.window,
        config.threshold,
        config.convergence
    );
    let data_port = CsvAdapter::new(data_path).with_derived_signal(true);
    let result =
        match run_analysis_pipeline(&data_port, &config, &CsvReportAdapter::new(), &output) {
            Ok(r) => r,
            Err(e) => return fail(&e),
        };

    let summary = &result.summary;
    eprintln!("\n=== Divergence Events ===");
    eprintln!("Events:           {}", summary.events);
    eprintln!("Converged:        {} ({:.1}%)", summary.converged, summary.convergence_rate_pct);
    match summary.avg_hours_to_converge {
        Some(h) => eprintln!("Avg To Converge:  {h:.1}h"),
        None => eprintln!("Avg To Converge:  n/a"),
    }
    match summary.worst_excursion {
        Some(z) => eprintln!("Worst Excursion:  {z:.2} sigma"),
        None => eprintln!("Worst Excursion:  n/a"),
    }
    eprintln!("\nEvents written to: {}", output.display());
    ExitCode::SUCCESS
}

pub fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checks = [
        validate_backtest_config(&adapter),
        validate_signal_config(&adapter),
        validate_sweep_config(&adapter),
        validate_analysis_config(&adapter),
    ];
    if let Some(Err(e)) = checks.iter().find(|c| c.is_err()) {
        return fail(e);
    }

    match resolve_data_path(&adapter, config_path, None) {
        Ok(path) => eprintln!("  data: {}", path.display()),
        Err(_) => eprintln!("  data: not configured (pass --data)"),
    }
    eprintln!("Config validated successfully");
    ExitCode::SUCCESS
}
