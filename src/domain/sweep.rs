//! Rebalance-frequency sweep.
//!
//! Every frequency in `1..=max_freq` is an independent backtest over the same
//! read-only bars, so the runs are fanned out on a rayon pool and collected
//! back in frequency order.

use rayon::prelude::*;

use super::backtest::{BacktestConfig, simulate};
use super::bar::{Bar, validate_series};
use super::error::PairtraderError;
use super::metrics::{Metrics, compute_stats};

pub const DEFAULT_MAX_FREQ: usize = 96;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub max_freq: usize,
    /// Worker threads; 0 lets rayon pick.
    pub workers: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            max_freq: DEFAULT_MAX_FREQ,
            workers: 0,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), PairtraderError> {
        if self.max_freq == 0 {
            return Err(PairtraderError::invalid(
                "sweep",
                "max_freq",
                "max_freq must be at least 1",
            ));
        }
        Ok(())
    }

    /// Frequencies at or past the series length, where bar 0 is the only
    /// rebalance bar and the run is one basket held to the forced close.
    pub fn collapsed_frequencies(&self, bar_count: usize) -> usize {
        let first = bar_count.max(1);
        if self.max_freq < first {
            0
        } else {
            self.max_freq - first + 1
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub frequency: usize,
    pub metrics: Metrics,
}

/// Backtest every rebalance frequency and summarize each run.
///
/// `base.rebalance_freq` is ignored; every other setting is shared by all runs.
pub fn run_sweep(
    bars: &[Bar],
    base: &BacktestConfig,
    sweep: &SweepConfig,
) -> Result<Vec<SweepRow>, PairtraderError> {
    sweep.validate()?;
    base.with_rebalance_freq(1).validate()?;
    validate_series(bars)?;

    let collapsed = sweep.collapsed_frequencies(bars.len());
    if collapsed > 0 {
        tracing::warn!(
            bars = bars.len(),
            max_freq = sweep.max_freq,
            collapsed,
            "max_freq reaches past the series; those runs hold one basket to the end"
        );
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(sweep.workers)
        .build()
        .map_err(|e| PairtraderError::WorkerPool {
            reason: e.to_string(),
        })?;

    tracing::info!(
        bars = bars.len(),
        max_freq = sweep.max_freq,
        threads = pool.current_num_threads(),
        "starting sweep"
    );

    let mut rows: Vec<SweepRow> = pool.install(|| {
        (1..=sweep.max_freq)
            .into_par_iter()
            .map(|frequency| {
                let config = base.with_rebalance_freq(frequency);
                let result = simulate(bars, &config);
                let metrics =
                    compute_stats(&result.trades, result.initial_capital, config.risk_free_rate);
                SweepRow { frequency, metrics }
            })
            .collect()
    });
    rows.sort_by_key(|row| row.frequency);

    let best = rows
        .iter()
        .max_by(|a, b| a.metrics.sharpe.total_cmp(&b.metrics.sharpe));
    if let Some(best) = best {
        tracing::info!(
            runs = rows.len(),
            best_freq = best.frequency,
            best_sharpe = best.metrics.sharpe,
            "sweep finished"
        );
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{SizingMode, run_backtest};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(15 * i as i64)
    }

    fn alternating(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let signal = if (i / 2) % 2 == 0 { 1 } else { -1 };
                let pa = 100.0 + (i as f64 * 0.7).sin() * 3.0;
                let pb = 10.0 + (i as f64 * 0.3).cos();
                Bar::new(ts(i), pa, pb, signal)
            })
            .collect()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            ratio: 10.0,
            sizing: SizingMode::Dynamic,
            funding_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn default_sweep_config() {
        let cfg = SweepConfig::default();
        assert_eq!(cfg.max_freq, 96);
        assert_eq!(cfg.workers, 0);
    }

    #[test]
    fn one_row_per_frequency_in_order() {
        let sweep = SweepConfig {
            max_freq: 5,
            workers: 2,
        };
        let rows = run_sweep(&alternating(10), &config(), &sweep).unwrap();
        let freqs: Vec<usize> = rows.iter().map(|r| r.frequency).collect();
        assert_eq!(freqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn matches_individual_backtests() {
        let bars = alternating(40);
        let base = config();
        let rows = run_sweep(
            &bars,
            &base,
            &SweepConfig {
                max_freq: 6,
                workers: 3,
            },
        )
        .unwrap();

        for row in &rows {
            let cfg = base.with_rebalance_freq(row.frequency);
            let result = run_backtest(&bars, &cfg).unwrap();
            let expected = compute_stats(&result.trades, result.initial_capital, cfg.risk_free_rate);
            assert_eq!(row.metrics, expected);
        }
    }

    #[test]
    fn keeps_zero_trade_rows() {
        let bars: Vec<Bar> = (0..4).map(|i| Bar::new(ts(i), 10.0, 1.0, 0)).collect();
        let rows = run_sweep(
            &bars,
            &config(),
            &SweepConfig {
                max_freq: 3,
                workers: 1,
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.metrics == Metrics::zeroed()));
    }

    #[test]
    fn collapsed_frequency_count() {
        let sweep = SweepConfig {
            max_freq: 40,
            workers: 0,
        };
        assert_eq!(sweep.collapsed_frequencies(10), 31);
        assert_eq!(sweep.collapsed_frequencies(40), 1);
        assert_eq!(sweep.collapsed_frequencies(41), 0);
    }

    #[test]
    fn frequencies_past_series_hold_one_basket() {
        let bars = alternating(10);
        let rows = run_sweep(
            &bars,
            &config(),
            &SweepConfig {
                max_freq: 40,
                workers: 2,
            },
        )
        .unwrap();

        assert_eq!(rows.len(), 40);
        for row in rows.iter().filter(|r| r.frequency >= bars.len()) {
            assert_eq!(row.metrics.trade_count, 1);
            assert_eq!(row.metrics, rows[bars.len() - 1].metrics);
        }
    }

    #[test]
    fn rejects_zero_max_freq() {
        let err = run_sweep(
            &alternating(4),
            &config(),
            &SweepConfig {
                max_freq: 0,
                workers: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, PairtraderError::ConfigInvalid { ref key, .. } if key == "max_freq"));
    }

    #[test]
    fn rejects_empty_series() {
        let err = run_sweep(&[], &config(), &SweepConfig::default()).unwrap_err();
        assert!(matches!(err, PairtraderError::EmptySeries));
    }
}
