//! Spread stationarity analysis.
//!
//! Rolling z-scores of the price spread, and the divergence events they show:
//! a bar whose |z| breaks `threshold`, followed or not by |z| falling back
//! under `convergence` within `look_forward` bars.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use super::bar::{Bar, validate_series};
use super::error::PairtraderError;

pub const DEFAULT_WINDOW: usize = 20;
pub const DEFAULT_THRESHOLD: f64 = 2.0;
pub const DEFAULT_CONVERGENCE: f64 = 0.5;
pub const DEFAULT_LOOK_FORWARD: usize = 96;

const MIN_STD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadKind {
    /// `price_a - price_b`
    Diff,
    /// `price_a / price_b`
    Ratio,
    /// `ln(price_a) - ln(price_b)`
    #[default]
    LogDiff,
}

impl SpreadKind {
    pub fn value(self, price_a: f64, price_b: f64) -> f64 {
        match self {
            SpreadKind::Diff => price_a - price_b,
            SpreadKind::Ratio => price_a / price_b,
            SpreadKind::LogDiff => price_a.ln() - price_b.ln(),
        }
    }
}

impl FromStr for SpreadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diff" => Ok(SpreadKind::Diff),
            "ratio" => Ok(SpreadKind::Ratio),
            "log_diff" => Ok(SpreadKind::LogDiff),
            other => Err(format!(
                "unknown spread '{other}' (expected diff, ratio or log_diff)"
            )),
        }
    }
}

impl fmt::Display for SpreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadKind::Diff => write!(f, "diff"),
            SpreadKind::Ratio => write!(f, "ratio"),
            SpreadKind::LogDiff => write!(f, "log_diff"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub spread: SpreadKind,
    /// Rolling window in bars.
    pub window: usize,
    pub threshold: f64,
    pub convergence: f64,
    /// Bars after a divergence searched for convergence.
    pub look_forward: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            spread: SpreadKind::default(),
            window: DEFAULT_WINDOW,
            threshold: DEFAULT_THRESHOLD,
            convergence: DEFAULT_CONVERGENCE,
            look_forward: DEFAULT_LOOK_FORWARD,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), PairtraderError> {
        if self.window < 2 {
            return Err(PairtraderError::invalid(
                "analysis",
                "window",
                "window must be at least 2 bars",
            ));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(PairtraderError::invalid(
                "analysis",
                "threshold",
                "threshold must be a positive number",
            ));
        }
        if !self.convergence.is_finite()
            || self.convergence < 0.0
            || self.convergence >= self.threshold
        {
            return Err(PairtraderError::invalid(
                "analysis",
                "convergence",
                "convergence must be non-negative and below threshold",
            ));
        }
        if self.look_forward == 0 {
            return Err(PairtraderError::invalid(
                "analysis",
                "look_forward",
                "look_forward must be at least 1 bar",
            ));
        }
        Ok(())
    }
}

pub fn spread_series(bars: &[Bar], kind: SpreadKind) -> Vec<f64> {
    bars.iter().map(|b| kind.value(b.price_a, b.price_b)).collect()
}

/// Z-score of each value against the trailing `window` values ending at it,
/// using the sample standard deviation.
///
/// The first `window - 1` entries have no full window and are `None`, as is
/// any window with zero spread.
pub fn rolling_zscore(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window < 2 || values.len() < window {
        return vec![None; values.len()];
    }

    let mut result = vec![None; window - 1];
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        let n = slice.len() as f64;
        let mean = slice.iter().sum::<f64>() / n;
        let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = var.sqrt();
        result.push((std > MIN_STD).then(|| (values[i] - mean) / std));
    }
    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct Convergence {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub z: f64,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceEvent {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub entry_z: f64,
    pub convergence: Option<Convergence>,
    /// Largest |z| over the forward window; `|entry_z|` when that window is empty.
    pub max_excursion: f64,
}

impl DivergenceEvent {
    pub fn converged(&self) -> bool {
        self.convergence.is_some()
    }

    /// Spread above its rolling mean at the divergence.
    pub fn is_above(&self) -> bool {
        self.entry_z > 0.0
    }

    pub fn hours_to_converge(&self) -> Option<f64> {
        self.convergence.as_ref().map(|c| c.hours)
    }
}

/// Scan `zscores` (aligned with `bars`) for divergence events.
///
/// Bars up to and including the last convergence point are skipped, so a
/// converged excursion is counted once. An excursion that never converges does
/// not advance that point, and each of its bars beyond the threshold is its own
/// event.
pub fn detect_events(
    bars: &[Bar],
    zscores: &[Option<f64>],
    config: &AnalysisConfig,
) -> Vec<DivergenceEvent> {
    let n = bars.len().min(zscores.len());
    let mut events = Vec::new();
    let mut last_convergence: Option<usize> = None;

    for i in 0..n {
        let Some(entry_z) = zscores[i] else { continue };
        if entry_z.abs() <= config.threshold {
            continue;
        }
        if last_convergence.is_some_and(|last| i <= last) {
            continue;
        }

        let end = (i + config.look_forward + 1).min(n);
        let forward = (i + 1)..end;

        let convergence = forward.clone().find_map(|j| {
            zscores[j]
                .filter(|z| z.abs() < config.convergence)
                .map(|z| Convergence {
                    index: j,
                    timestamp: bars[j].timestamp,
                    z,
                    hours: (bars[j].timestamp - bars[i].timestamp).num_seconds() as f64 / 3600.0,
                })
        });
        let max_excursion = forward
            .filter_map(|j| zscores[j])
            .map(f64::abs)
            .reduce(f64::max)
            .unwrap_or(entry_z.abs());

        if let Some(c) = &convergence {
            last_convergence = Some(c.index);
        }
        tracing::debug!(
            index = i,
            entry_z,
            converged = convergence.is_some(),
            "divergence"
        );
        events.push(DivergenceEvent {
            index: i,
            timestamp: bars[i].timestamp,
            entry_z,
            convergence,
            max_excursion,
        });
    }
    events
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisSummary {
    pub events: usize,
    pub converged: usize,
    pub convergence_rate_pct: f64,
    /// Mean over converged events only.
    pub avg_hours_to_converge: Option<f64>,
    pub worst_excursion: Option<f64>,
}

pub fn summarize(events: &[DivergenceEvent]) -> AnalysisSummary {
    if events.is_empty() {
        return AnalysisSummary::default();
    }

    let hours: Vec<f64> = events.iter().filter_map(|e| e.hours_to_converge()).collect();
    let converged = hours.len();
    AnalysisSummary {
        events: events.len(),
        converged,
        convergence_rate_pct: converged as f64 / events.len() as f64 * 100.0,
        avg_hours_to_converge: (converged > 0).then(|| hours.iter().sum::<f64>() / converged as f64),
        worst_excursion: events.iter().map(|e| e.max_excursion).reduce(f64::max),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub zscores: Vec<Option<f64>>,
    pub events: Vec<DivergenceEvent>,
    pub summary: AnalysisSummary,
}

/// Validate config and bars, then z-score the configured spread and collect
/// its divergence events.
pub fn analyze(bars: &[Bar], config: &AnalysisConfig) -> Result<AnalysisResult, PairtraderError> {
    config.validate()?;
    validate_series(bars)?;

    let spread = spread_series(bars, config.spread);
    let zscores = rolling_zscore(&spread, config.window);
    let events = detect_events(bars, &zscores, config);
    let summary = summarize(&events);

    tracing::info!(
        bars = bars.len(),
        spread = %config.spread,
        events = summary.events,
        converged = summary.converged,
        "analysis finished"
    );
    Ok(AnalysisResult {
        zscores,
        events,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 17)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(15 * i as i64)
    }

    fn bars(prices_a: &[f64]) -> Vec<Bar> {
        prices_a
            .iter()
            .enumerate()
            .map(|(i, &pa)| Bar::new(ts(i), pa, 1.0, 0))
            .collect()
    }

    fn config(window: usize, look_forward: usize) -> AnalysisConfig {
        AnalysisConfig {
            spread: SpreadKind::Diff,
            window,
            look_forward,
            ..Default::default()
        }
    }

    #[test]
    fn spread_kinds() {
        assert_relative_eq!(SpreadKind::Diff.value(12.0, 4.0), 8.0);
        assert_relative_eq!(SpreadKind::Ratio.value(12.0, 4.0), 3.0);
        assert_relative_eq!(SpreadKind::LogDiff.value(12.0, 4.0), 3.0f64.ln(), epsilon = 1e-12);
        assert_eq!("LOG_DIFF".parse::<SpreadKind>(), Ok(SpreadKind::LogDiff));
        assert!("spread".parse::<SpreadKind>().is_err());
    }

    #[test]
    fn zscore_warms_up_then_uses_sample_std() {
        let z = rolling_zscore(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(z[0], None);
        assert_eq!(z[1], None);
        // window [1,2,3]: mean 2, sample std 1
        assert_relative_eq!(z[2].unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(z[3].unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zscore_flat_window_is_none() {
        let z = rolling_zscore(&[5.0, 5.0, 5.0, 6.0], 3);
        assert_eq!(z[2], None);
        assert!(z[3].is_some());
    }

    #[test]
    fn zscore_short_series_is_all_none() {
        assert_eq!(rolling_zscore(&[1.0, 2.0], 3), vec![None, None]);
    }

    #[test]
    fn converging_event_reports_elapsed_hours() {
        let zs = vec![None, Some(2.5), Some(1.2), Some(0.3), Some(0.1)];
        let events = detect_events(&bars(&[1.0; 5]), &zs, &config(2, 96));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.is_above());
        let c = event.convergence.as_ref().unwrap();
        assert_eq!(c.index, 3);
        assert_relative_eq!(c.z, 0.3);
        assert_relative_eq!(c.hours, 0.5);
        assert_relative_eq!(event.max_excursion, 1.2);
    }

    #[test]
    fn bars_before_convergence_are_not_new_events() {
        let zs = vec![Some(-2.5), Some(-3.0), Some(0.2), Some(2.1)];
        let events = detect_events(&bars(&[1.0; 4]), &zs, &config(2, 96));

        let indices: Vec<usize> = events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert!(!events[0].is_above());
        assert_relative_eq!(events[0].max_excursion, 3.0);
        // last bar: empty forward window
        assert!(!events[1].converged());
        assert_relative_eq!(events[1].max_excursion, 2.1);
    }

    #[test]
    fn unconverged_excursion_counts_every_bar() {
        let zs = vec![Some(2.5), Some(2.6), Some(1.0)];
        let events = detect_events(&bars(&[1.0; 3]), &zs, &config(2, 96));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.converged()));
    }

    #[test]
    fn convergence_outside_look_forward_is_missed() {
        let zs = vec![Some(2.5), Some(1.0), Some(1.0), Some(0.1)];
        let events = detect_events(&bars(&[1.0; 4]), &zs, &config(2, 2));
        assert!(!events[0].converged());
    }

    #[test]
    fn threshold_is_strict() {
        let zs = vec![Some(2.0), Some(-2.0)];
        assert!(detect_events(&bars(&[1.0; 2]), &zs, &config(2, 96)).is_empty());
    }

    #[test]
    fn summary_rates_and_means() {
        let zs = vec![Some(2.5), Some(0.1), Some(-2.2), Some(-1.0), Some(0.4), Some(3.0)];
        let events = detect_events(&bars(&[1.0; 6]), &zs, &config(2, 96));
        let summary = summarize(&events);

        assert_eq!(summary.events, 3);
        assert_eq!(summary.converged, 2);
        assert_relative_eq!(summary.convergence_rate_pct, 200.0 / 3.0, epsilon = 1e-9);
        // 0.25h and 0.5h
        assert_relative_eq!(summary.avg_hours_to_converge.unwrap(), 0.375);
        assert_relative_eq!(summary.worst_excursion.unwrap(), 3.0);
    }

    #[test]
    fn empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.events, 0);
        assert_eq!(summary.convergence_rate_pct, 0.0);
        assert_eq!(summary.avg_hours_to_converge, None);
    }

    #[test]
    fn analyze_finds_a_spike() {
        let mut prices: Vec<f64> = (0..40).map(|i| 10.0 + 0.1 * (i % 2) as f64).collect();
        prices[30] = 14.0;
        let result = analyze(&bars(&prices), &config(20, 96)).unwrap();

        assert_eq!(result.zscores.len(), 40);
        assert_eq!(result.events[0].index, 30);
        assert!(result.events[0].converged());
        assert_eq!(result.summary.events, result.events.len());
    }

    #[test]
    fn analyze_rejects_bad_config_and_series() {
        let cfg = AnalysisConfig {
            convergence: 2.5,
            ..Default::default()
        };
        let err = analyze(&bars(&[1.0; 3]), &cfg).unwrap_err();
        assert!(matches!(err, PairtraderError::ConfigInvalid { ref key, .. } if key == "convergence"));

        let err = analyze(&[], &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, PairtraderError::EmptySeries));
    }
}
