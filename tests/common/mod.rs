#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use pairtrader::domain::backtest::{BacktestConfig, SizingMode};
pub use pairtrader::domain::bar::{Bar, FundingIndices};
use pairtrader::domain::error::PairtraderError;
use pairtrader::ports::data_port::DataPort;

pub struct MockDataPort {
    pub bars: Vec<Bar>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars, error: None }
    }

    pub fn with_error(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self) -> Result<Vec<Bar>, PairtraderError> {
        match &self.error {
            Some(reason) => Err(PairtraderError::Data {
                reason: reason.clone(),
            }),
            None => Ok(self.bars.clone()),
        }
    }
}

/// 15-minute bar timestamps starting 2025-02-17 00:00.
pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 2, 17)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::minutes(15 * i as i64)
}

pub fn make_bar(i: usize, price_a: f64, price_b: f64, signal: i8) -> Bar {
    Bar::new(ts(i), price_a, price_b, signal)
}

pub fn make_bars(prices_a: &[f64], prices_b: &[f64], signals: &[i8]) -> Vec<Bar> {
    assert_eq!(prices_a.len(), prices_b.len());
    assert_eq!(prices_a.len(), signals.len());
    prices_a
        .iter()
        .zip(prices_b)
        .zip(signals)
        .enumerate()
        .map(|(i, ((&pa, &pb), &s))| make_bar(i, pa, pb, s))
        .collect()
}

/// A wavy but deterministic series with signals flipping every few bars.
pub fn synthetic_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let pa = 100.0 + 4.0 * (x * 0.37).sin() + 0.05 * x;
            let pb = 10.0 + 0.3 * (x * 0.21).cos();
            let signal = match (i / 3) % 3 {
                0 => 1,
                1 => -1,
                _ => 0,
            };
            make_bar(i, pa, pb, signal)
        })
        .collect()
}

pub fn fixed_config(ratio: f64, fee_rate: f64) -> BacktestConfig {
    BacktestConfig {
        ratio,
        fee_rate,
        rebalance_freq: 1,
        sizing: SizingMode::Fixed,
        base_qty: 1.0,
        funding_enabled: false,
        ..Default::default()
    }
}

pub fn dynamic_config(ratio: f64, fee_rate: f64) -> BacktestConfig {
    BacktestConfig {
        sizing: SizingMode::Dynamic,
        ..fixed_config(ratio, fee_rate)
    }
}

pub fn write_file(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub const BARS_CSV: &str = "timestamp,price_a,price_b,signal
2025-02-17 00:00:00,100,10,0
2025-02-17 00:15:00,101,10,1
2025-02-17 00:30:00,103,10.1,1
2025-02-17 00:45:00,102,10.2,-1
2025-02-17 01:00:00,99,10.1,-1
2025-02-17 01:15:00,98,10,0
2025-02-17 01:30:00,100,10,1
2025-02-17 01:45:00,101,10.1,1
";
