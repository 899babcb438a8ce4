//! Performance statistics over a closed-trade log.
//!
//! Everything is measured per trade: Sharpe uses per-trade returns annualized
//! by the average holding time, and drawdown is taken on realized equity at
//! trade boundaries. Degenerate inputs (no trades, zero capital, flat returns,
//! zero elapsed time) produce zeros rather than inf/NaN.

use super::position::Trade;

const HOURS_PER_YEAR: f64 = 8760.0;
const DAYS_PER_YEAR: f64 = 365.0;
const STD_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    pub trade_count: usize,
    pub net_pnl: f64,
    pub final_return_pct: f64,
    pub sharpe: f64,
    /// Most negative drawdown, in percent (0 or below).
    pub min_drawdown: f64,
    pub win_rate: f64,
    pub trades_per_year: f64,
    pub avg_hold_hours: f64,
}

impl Metrics {
    pub fn zeroed() -> Self {
        Metrics::default()
    }
}

pub fn compute_stats(trades: &[Trade], initial_capital: f64, risk_free_rate: f64) -> Metrics {
    if trades.is_empty() || initial_capital == 0.0 || !initial_capital.is_finite() {
        return Metrics::zeroed();
    }

    let n = trades.len() as f64;
    let net_pnl: f64 = trades.iter().map(|t| t.total_pnl).sum();
    let final_return_pct = net_pnl / initial_capital * 100.0;

    let first_entry = trades.iter().map(|t| t.entry_time).min();
    let last_exit = trades.iter().map(|t| t.exit_time).max();
    let elapsed_days = match (first_entry, last_exit) {
        (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 86_400.0,
        _ => 0.0,
    };
    let trades_per_year = if elapsed_days > 0.0 {
        n / elapsed_days * DAYS_PER_YEAR
    } else {
        0.0
    };

    let avg_hold_hours = trades.iter().map(Trade::hold_hours).sum::<f64>() / n;

    let returns: Vec<f64> = trades.iter().map(|t| t.return_frac).collect();
    let sharpe = compute_sharpe(&returns, avg_hold_hours, risk_free_rate);
    let min_drawdown = compute_min_drawdown(trades, initial_capital);

    let wins = returns.iter().filter(|&&r| r > 0.0).count() as f64;
    let win_rate = wins / n * 100.0;

    Metrics {
        trade_count: trades.len(),
        net_pnl,
        final_return_pct,
        sharpe,
        min_drawdown,
        win_rate,
        trades_per_year,
        avg_hold_hours,
    }
}

/// Annualized per-trade Sharpe over excess returns, using sample std.
fn compute_sharpe(returns: &[f64], avg_hold_hours: f64, risk_free_rate: f64) -> f64 {
    if returns.len() < 2 || avg_hold_hours <= 0.0 {
        return 0.0;
    }

    let rf_per_trade = risk_free_rate * (avg_hold_hours / HOURS_PER_YEAR);
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_trade).collect();

    let n = excess.len() as f64;
    let mean = excess.iter().sum::<f64>() / n;
    let variance = excess.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();

    if !(std > STD_EPSILON) {
        return 0.0;
    }
    let sharpe = mean / std * (HOURS_PER_YEAR / avg_hold_hours).sqrt();
    if sharpe.is_finite() { sharpe } else { 0.0 }
}

/// Minimum of equity / running_max - 1 over realized equity, in percent.
fn compute_min_drawdown(trades: &[Trade], initial_capital: f64) -> f64 {
    let mut equity = initial_capital;
    let mut peak = f64::NEG_INFINITY;
    let mut min_dd = 0.0_f64;

    for trade in trades {
        equity += trade.total_pnl;
        peak = peak.max(equity);
        if peak > 0.0 {
            min_dd = min_dd.min(equity / peak - 1.0);
        }
    }

    min_dd * 100.0
}
