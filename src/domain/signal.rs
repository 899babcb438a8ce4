//! Lagged spread signal.
//!
//! spread = price_a - ratio * price_b. A negative spread means A is cheap
//! relative to the basket (go long A / short B, signal +1); a positive spread
//! means A is rich (signal -1). Bar `i` only ever sees the signal computed on
//! bar `i - lag`, so a decision never uses the prices it trades at.

use std::str::FromStr;

use super::bar::Bar;

/// Where each bar's trading signal comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalSource {
    /// Precomputed (already lagged) `signal` column in the data file.
    #[default]
    Column,
    /// Derived from the lagged spread of the two price columns.
    Spread,
}

impl FromStr for SignalSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "column" => Ok(SignalSource::Column),
            "spread" => Ok(SignalSource::Spread),
            other => Err(format!("unknown signal source '{other}', expected column or spread")),
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Column => write!(f, "column"),
            SignalSource::Spread => write!(f, "spread"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub source: SignalSource,
    pub lag: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            source: SignalSource::Column,
            lag: 1,
        }
    }
}

pub fn spread(price_a: f64, price_b: f64, ratio: f64) -> f64 {
    price_a - ratio * price_b
}

pub fn spread_signal(spread: f64) -> i8 {
    if spread < 0.0 {
        1
    } else if spread > 0.0 {
        -1
    } else {
        0
    }
}

/// Overwrite each bar's signal with the spread signal from `lag` bars earlier.
///
/// The first `lag` bars have no prior spread and are dropped. `lag` must be at
/// least 1; callers validate that through configuration.
pub fn apply_lagged_spread_signal(bars: Vec<Bar>, ratio: f64, lag: usize) -> Vec<Bar> {
    debug_assert!(lag >= 1, "a zero lag would trade on same-bar information");

    let raw: Vec<i8> = bars
        .iter()
        .map(|b| spread_signal(spread(b.price_a, b.price_b, ratio)))
        .collect();

    bars.into_iter()
        .enumerate()
        .skip(lag)
        .map(|(i, mut bar)| {
            bar.signal = raw[i - lag];
            bar
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn bars(prices_a: &[f64]) -> Vec<Bar> {
        prices_a
            .iter()
            .enumerate()
            .map(|(i, &pa)| Bar::new(ts(i as u32), pa, 1.0, 0))
            .collect()
    }

    #[test]
    fn source_parses() {
        assert_eq!("Spread".parse::<SignalSource>(), Ok(SignalSource::Spread));
        assert_eq!(" column ".parse::<SignalSource>(), Ok(SignalSource::Column));
        assert!("zscore".parse::<SignalSource>().is_err());
        assert_eq!(SignalConfig::default().lag, 1);
    }

    #[test]
    fn spread_sign_mapping() {
        assert_eq!(spread_signal(spread(9.0, 1.0, 10.0)), 1);
        assert_eq!(spread_signal(spread(11.0, 1.0, 10.0)), -1);
        assert_eq!(spread_signal(spread(10.0, 1.0, 10.0)), 0);
    }

    #[test]
    fn lag_one_shifts_by_one_bar() {
        // raw signals: [+1, -1, -1, +1]
        let out = apply_lagged_spread_signal(bars(&[9.0, 11.0, 12.0, 8.0]), 10.0, 1);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].timestamp, ts(1));
        let signals: Vec<i8> = out.iter().map(|b| b.signal).collect();
        assert_eq!(signals, vec![1, -1, -1]);
    }

    #[test]
    fn lag_two_drops_two_bars() {
        let out = apply_lagged_spread_signal(bars(&[9.0, 11.0, 12.0, 8.0]), 10.0, 2);
        let signals: Vec<i8> = out.iter().map(|b| b.signal).collect();
        assert_eq!(signals, vec![1, -1]);
        assert_eq!(out[0].timestamp, ts(2));
    }

    #[test]
    fn signal_never_reflects_its_own_bar() {
        // Bar 2's own spread says +1, but it must carry bar 1's -1.
        let out = apply_lagged_spread_signal(bars(&[11.0, 11.0, 5.0]), 10.0, 1);
        assert_eq!(out[1].price_a, 5.0);
        assert_eq!(out[1].signal, -1);
    }

    #[test]
    fn lag_longer_than_series_yields_empty() {
        assert!(apply_lagged_spread_signal(bars(&[9.0, 11.0]), 10.0, 3).is_empty());
    }
}
