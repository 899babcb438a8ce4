//! Configuration loading and validation.
//!
//! Reads typed settings out of a [`ConfigPort`] and rejects anything the
//! engine cannot run with. A missing or blank key takes its default; a value
//! that is present but malformed is an error naming the section and key.

use crate::domain::analysis::{AnalysisConfig, SpreadKind};
use crate::domain::backtest::{BacktestConfig, SizingMode};
use crate::domain::error::PairtraderError;
use crate::domain::signal::{SignalConfig, SignalSource};
use crate::domain::sweep::{DEFAULT_MAX_FREQ, SweepConfig};
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    load_backtest_config(config).map(|_| ())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    load_signal_config(config).map(|_| ())
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    load_sweep_config(config).map(|_| ())
}

pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    load_analysis_config(config).map(|_| ())
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, PairtraderError> {
    let defaults = BacktestConfig::default();
    let sizing = match non_empty(config, "backtest", "sizing") {
        Some(raw) => raw
            .parse::<SizingMode>()
            .map_err(|reason| PairtraderError::invalid("backtest", "sizing", reason))?,
        None => defaults.sizing,
    };

    let backtest = BacktestConfig {
        ratio: read_double(config, "backtest", "ratio", defaults.ratio)?,
        fee_rate: read_double(config, "backtest", "fee_rate", defaults.fee_rate)?,
        rebalance_freq: read_count(config, "backtest", "rebalance_freq", defaults.rebalance_freq)?,
        sizing,
        base_qty: read_double(config, "backtest", "base_qty", defaults.base_qty)?,
        funding_enabled: read_bool(config, "backtest", "funding", defaults.funding_enabled)?,
        risk_free_rate: read_double(config, "backtest", "risk_free_rate", defaults.risk_free_rate)?,
    };
    backtest.validate()?;
    Ok(backtest)
}

pub fn load_signal_config(config: &dyn ConfigPort) -> Result<SignalConfig, PairtraderError> {
    let source = match non_empty(config, "signal", "source") {
        Some(raw) => raw
            .parse::<SignalSource>()
            .map_err(|reason| PairtraderError::invalid("signal", "source", reason))?,
        None => SignalSource::Column,
    };
    let lag = read_count(config, "signal", "lag", 1)?;
    if lag == 0 {
        return Err(PairtraderError::invalid(
            "signal",
            "lag",
            "lag must be at least 1 bar",
        ));
    }
    Ok(SignalConfig { source, lag })
}

pub fn load_sweep_config(config: &dyn ConfigPort) -> Result<SweepConfig, PairtraderError> {
    let sweep = SweepConfig {
        max_freq: read_count(config, "sweep", "max_freq", DEFAULT_MAX_FREQ)?,
        workers: read_count(config, "sweep", "workers", 0)?,
    };
    sweep.validate()?;
    Ok(sweep)
}

pub fn load_analysis_config(config: &dyn ConfigPort) -> Result<AnalysisConfig, PairtraderError> {
    let defaults = AnalysisConfig::default();
    let spread = match non_empty(config, "analysis", "spread") {
        Some(raw) => raw
            .parse::<SpreadKind>()
            .map_err(|reason| PairtraderError::invalid("analysis", "spread", reason))?,
        None => defaults.spread,
    };
    let analysis = AnalysisConfig {
        spread,
        window: read_count(config, "analysis", "window", defaults.window)?,
        threshold: read_double(config, "analysis", "threshold", defaults.threshold)?,
        convergence: read_double(config, "analysis", "convergence", defaults.convergence)?,
        look_forward: read_count(config, "analysis", "look_forward", defaults.look_forward)?,
    };
    analysis.validate()?;
    Ok(analysis)
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, PairtraderError> {
    config
        .get_double(section, key)
        .map(|v| v.unwrap_or(default))
        .map_err(|reason| PairtraderError::invalid(section, key, reason))
}

fn read_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, PairtraderError> {
    match config
        .get_uint(section, key)
        .map_err(|reason| PairtraderError::invalid(section, key, reason))?
    {
        None => Ok(default),
        Some(value) => usize::try_from(value)
            .map_err(|_| PairtraderError::invalid(section, key, format!("{value} is too large"))),
    }
}

fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, PairtraderError> {
    config
        .get_bool(section, key)
        .map(|v| v.unwrap_or(default))
        .map_err(|reason| PairtraderError::invalid(section, key, reason))
}
