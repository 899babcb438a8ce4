//! Backtest configuration and the accounting engine.
//!
//! The engine is a sequential fold over the bar series with two states:
//! flat, or holding exactly one basket. Trades only execute on rebalance bars
//! (every `rebalance_freq`-th bar); every other bar just marks the open basket
//! to market. A basket still open after the last bar is liquidated at that
//! bar's prices.
//!
//! Signals are consumed as given. The engine never derives a signal from the
//! prices of the bar it trades on; the lag is the data supplier's contract
//! (see [`crate::domain::signal`]).

use std::str::FromStr;

use super::bar::{Bar, Direction, validate_series};
use super::error::PairtraderError;
use super::position::{Position, Trade, basket_fee};
use super::timeline::{Snapshot, Timeline};

pub const DEFAULT_FEE_RATE: f64 = 0.001;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.0406;

/// How basket quantities are chosen when a position is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingMode {
    /// Re-size from released capital on every re-open (compounding).
    #[default]
    Dynamic,
    /// Always trade `base_qty` of A and `ratio * base_qty` of B.
    Fixed,
}

impl FromStr for SizingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dynamic" => Ok(SizingMode::Dynamic),
            "fixed" => Ok(SizingMode::Fixed),
            other => Err(format!("unknown sizing mode '{other}' (expected dynamic or fixed)")),
        }
    }
}

impl std::fmt::Display for SizingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingMode::Dynamic => write!(f, "dynamic"),
            SizingMode::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Units of B per unit of A in the basket.
    pub ratio: f64,
    pub fee_rate: f64,
    pub rebalance_freq: usize,
    pub sizing: SizingMode,
    /// Units of A in the first basket (and every basket in fixed mode).
    pub base_qty: f64,
    pub funding_enabled: bool,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            ratio: 1.0,
            fee_rate: DEFAULT_FEE_RATE,
            rebalance_freq: 1,
            sizing: SizingMode::Dynamic,
            base_qty: 1.0,
            funding_enabled: true,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), PairtraderError> {
        let bad = |key: &str, reason: &str| Err(PairtraderError::invalid("backtest", key, reason));

        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            return bad("ratio", "ratio must be positive");
        }
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 {
            return bad("fee_rate", "fee_rate must be non-negative");
        }
        if self.rebalance_freq == 0 {
            return bad("rebalance_freq", "rebalance_freq must be at least 1");
        }
        if !self.base_qty.is_finite() || self.base_qty <= 0.0 {
            return bad("base_qty", "base_qty must be positive");
        }
        if !self.risk_free_rate.is_finite() || !(0.0..1.0).contains(&self.risk_free_rate) {
            return bad("risk_free_rate", "risk_free_rate must be between 0 and 1");
        }
        Ok(())
    }

    pub fn with_rebalance_freq(&self, rebalance_freq: usize) -> Self {
        BacktestConfig {
            rebalance_freq,
            ..self.clone()
        }
    }

    pub fn is_rebalance_bar(&self, index: usize) -> bool {
        index % self.rebalance_freq == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub timeline: Timeline,
    pub trades: Vec<Trade>,
    /// Notional of the first basket; 0 when nothing was ever opened.
    pub initial_capital: f64,
    pub final_equity: f64,
    pub sizing: SizingMode,
}

impl BacktestResult {
    pub fn net_pnl(&self) -> f64 {
        self.final_equity - self.initial_capital
    }
}

/// Accounting state machine. Feed bars in order with [`Engine::step`], then
/// call [`Engine::finish`].
#[derive(Debug)]
pub struct Engine<'a> {
    config: &'a BacktestConfig,
    position: Option<Position>,
    /// Realized capital while flat; `None` before the first open.
    capital: Option<f64>,
    initial_capital: f64,
    timeline: Timeline,
    trades: Vec<Trade>,
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a BacktestConfig) -> Self {
        Engine {
            config,
            position: None,
            capital: None,
            initial_capital: 0.0,
            timeline: Timeline::default(),
            trades: Vec::new(),
        }
    }

    pub fn with_capacity(config: &'a BacktestConfig, bars: usize) -> Self {
        Engine {
            timeline: Timeline::with_capacity(bars + 1),
            ..Engine::new(config)
        }
    }

    pub fn sizing_mode(&self) -> SizingMode {
        self.config.sizing
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Process bar `index` of the series.
    pub fn step(&mut self, index: usize, bar: &Bar) {
        let rebalance = self.config.is_rebalance_bar(index);
        let mut snap = Snapshot::blank(bar, self.capital);

        match self.position.take() {
            Some(position) => {
                let mark = position.mark_to_market(bar, self.config.funding_enabled);
                snap.qty_a = position.qty_a;
                snap.qty_b = position.qty_b;
                snap.pnl_a = mark.pnl_a;
                snap.pnl_b = mark.pnl_b;
                snap.funding_a = mark.funding_a;
                snap.funding_b = mark.funding_b;
                snap.equity = Some(mark.equity);

                if rebalance && bar.signal != position.signal() {
                    let exit_fee = basket_fee(position.qty_a, position.qty_b, bar, self.config.fee_rate);
                    let released = mark.equity - exit_fee;
                    let trade = Trade::close(&position, &mark, bar.timestamp, exit_fee, false);
                    tracing::debug!(
                        ts = %bar.timestamp,
                        direction = %position.direction,
                        pnl = trade.total_pnl,
                        capital = released,
                        "CLOSE"
                    );

                    self.capital = Some(released);
                    self.trades.push(trade.clone());
                    snap.is_exit = true;
                    snap.fee = exit_fee;
                    snap.equity = Some(released);
                    snap.qty_a = 0.0;
                    snap.qty_b = 0.0;
                    snap.trade = Some(trade);

                    if let Some(direction) = bar.direction() {
                        let opened = self.open(bar, direction, released, false);
                        snap.is_entry = true;
                        snap.qty_a = opened.qty_a;
                        snap.qty_b = opened.qty_b;
                        snap.fee += opened.entry_fee;
                        snap.equity = Some(opened.net_capital_at_entry);
                        self.position = Some(opened);
                    }
                } else {
                    self.position = Some(position);
                }
            }
            None => {
                if let (true, Some(direction)) = (rebalance, bar.direction()) {
                    let (available, first) = match self.capital {
                        Some(capital) => (capital, false),
                        None => {
                            let notional = self.config.base_qty * bar.price_a
                                + self.config.ratio * self.config.base_qty * bar.price_b;
                            self.initial_capital = notional;
                            (notional, true)
                        }
                    };
                    let opened = self.open(bar, direction, available, first);
                    snap.is_entry = true;
                    snap.qty_a = opened.qty_a;
                    snap.qty_b = opened.qty_b;
                    snap.fee = opened.entry_fee;
                    snap.equity = Some(opened.net_capital_at_entry);
                    self.position = Some(opened);
                }
            }
        }

        self.timeline.push(snap);
    }

    fn open(&self, bar: &Bar, direction: Direction, available: f64, first: bool) -> Position {
        let (qty_a, qty_b) = self.basket_quantities(bar, available, first);
        let position = Position::open(
            bar,
            direction,
            qty_a,
            qty_b,
            available,
            self.config.fee_rate,
            self.config.funding_enabled,
        );
        tracing::debug!(
            ts = %bar.timestamp,
            direction = %direction,
            qty_a,
            qty_b,
            capital = position.net_capital_at_entry,
            "OPEN"
        );
        position
    }

    fn basket_quantities(&self, bar: &Bar, available: f64, first: bool) -> (f64, f64) {
        let ratio = self.config.ratio;
        // the first basket is always base_qty so initial capital is its notional
        let qty_a = match (self.config.sizing, first) {
            (SizingMode::Fixed, _) | (SizingMode::Dynamic, true) => self.config.base_qty,
            (SizingMode::Dynamic, false) => available / (bar.price_a + ratio * bar.price_b),
        };
        (qty_a, ratio * qty_a)
    }

    /// Liquidate any open basket at `last_bar` and hand back the run.
    pub fn finish(mut self, last_bar: &Bar) -> BacktestResult {
        if let Some(position) = self.position.take() {
            let mark = position.mark_to_market(last_bar, self.config.funding_enabled);
            let exit_fee = basket_fee(position.qty_a, position.qty_b, last_bar, self.config.fee_rate);
            let released = mark.equity - exit_fee;
            let trade = Trade::close(&position, &mark, last_bar.timestamp, exit_fee, true);
            tracing::debug!(
                ts = %last_bar.timestamp,
                direction = %position.direction,
                pnl = trade.total_pnl,
                capital = released,
                "FORCED CLOSE"
            );

            let mut snap = Snapshot::blank(last_bar, Some(released));
            snap.signal = position.signal();
            snap.is_exit = true;
            snap.forced = true;
            snap.pnl_a = mark.pnl_a;
            snap.pnl_b = mark.pnl_b;
            snap.funding_a = mark.funding_a;
            snap.funding_b = mark.funding_b;
            snap.fee = exit_fee;
            snap.trade = Some(trade.clone());

            self.capital = Some(released);
            self.trades.push(trade);
            self.timeline.push(snap);
        }

        BacktestResult {
            timeline: self.timeline,
            trades: self.trades,
            initial_capital: self.initial_capital,
            final_equity: self.capital.unwrap_or(0.0),
            sizing: self.config.sizing,
        }
    }
}

/// Validate inputs, then run the engine over the whole series.
pub fn run_backtest(bars: &[Bar], config: &BacktestConfig) -> Result<BacktestResult, PairtraderError> {
    config.validate()?;
    validate_series(bars)?;
    tracing::info!(
        bars = bars.len(),
        rebalance_freq = config.rebalance_freq,
        sizing = %config.sizing,
        "starting backtest"
    );
    let result = simulate(bars, config);
    tracing::info!(
        trades = result.trades.len(),
        final_equity = result.final_equity,
        "backtest finished"
    );
    Ok(result)
}

/// Run over an already-validated, non-empty series.
pub(crate) fn simulate(bars: &[Bar], config: &BacktestConfig) -> BacktestResult {
    let mut engine = Engine::with_capacity(config, bars.len());
    for (index, bar) in bars.iter().enumerate() {
        engine.step(index, bar);
    }
    match bars.last() {
        Some(last) => engine.finish(last),
        None => BacktestResult {
            timeline: Timeline::default(),
            trades: Vec::new(),
            initial_capital: 0.0,
            final_equity: 0.0,
            sizing: config.sizing,
        },
    }
}
