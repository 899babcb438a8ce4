//! Basket position and closed trade record.

use chrono::NaiveDateTime;

use super::bar::{Bar, Direction};

/// Fee for one fill on one leg: |qty| * price * rate.
pub fn leg_fee(qty: f64, price: f64, rate: f64) -> f64 {
    qty.abs() * price * rate
}

/// Fee for filling both legs of the basket at the bar's prices.
pub fn basket_fee(qty_a: f64, qty_b: f64, bar: &Bar, rate: f64) -> f64 {
    leg_fee(qty_a, bar.price_a, rate) + leg_fee(qty_b, bar.price_b, rate)
}

/// An open basket. Built once on entry and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub entry_price_a: f64,
    pub entry_price_b: f64,
    pub qty_a: f64,
    pub qty_b: f64,
    /// Capital deployed after paying the entry fee.
    pub net_capital_at_entry: f64,
    pub entry_fee: f64,
    pub entry_funding_idx_a: f64,
    pub entry_funding_idx_b: f64,
}

/// Mark-to-market of a position against one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mark {
    pub pnl_a: f64,
    pub pnl_b: f64,
    pub funding_a: f64,
    pub funding_b: f64,
    pub equity: f64,
}

impl Mark {
    pub fn price_pnl(&self) -> f64 {
        self.pnl_a + self.pnl_b
    }

    pub fn funding_pnl(&self) -> f64 {
        self.funding_a + self.funding_b
    }
}

impl Position {
    /// Open a basket at `bar`'s prices, paying the entry fee out of `available_capital`.
    pub fn open(
        bar: &Bar,
        direction: Direction,
        qty_a: f64,
        qty_b: f64,
        available_capital: f64,
        fee_rate: f64,
        funding_enabled: bool,
    ) -> Self {
        let entry_fee = basket_fee(qty_a, qty_b, bar, fee_rate);
        let (entry_funding_idx_a, entry_funding_idx_b) = if funding_enabled {
            (
                bar.funding.leg_a(direction),
                bar.funding.leg_b(direction),
            )
        } else {
            (0.0, 0.0)
        };

        Position {
            direction,
            entry_time: bar.timestamp,
            entry_price_a: bar.price_a,
            entry_price_b: bar.price_b,
            qty_a,
            qty_b,
            net_capital_at_entry: available_capital - entry_fee,
            entry_fee,
            entry_funding_idx_a,
            entry_funding_idx_b,
        }
    }

    pub fn signal(&self) -> i8 {
        self.direction.signal()
    }

    /// Unrealized PnL and equity at `bar`. Leg B is the inverse hedge.
    pub fn mark_to_market(&self, bar: &Bar, funding_enabled: bool) -> Mark {
        let s = self.direction.sign();
        let pnl_a = s * self.qty_a * (bar.price_a - self.entry_price_a);
        let pnl_b = -s * self.qty_b * (bar.price_b - self.entry_price_b);

        let (funding_a, funding_b) = if funding_enabled {
            let delta_a = bar.funding.leg_a(self.direction) - self.entry_funding_idx_a;
            let delta_b = bar.funding.leg_b(self.direction) - self.entry_funding_idx_b;
            // positive cumulative funding is paid by the holder of that side
            (-s * self.qty_a * delta_a, s * self.qty_b * delta_b)
        } else {
            (0.0, 0.0)
        };

        Mark {
            pnl_a,
            pnl_b,
            funding_a,
            funding_b,
            equity: self.net_capital_at_entry + pnl_a + pnl_b + funding_a + funding_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub direction: Direction,
    pub pnl_a: f64,
    pub pnl_b: f64,
    pub funding_a: f64,
    pub funding_b: f64,
    /// Entry plus exit fee.
    pub fees: f64,
    pub total_pnl: f64,
    pub capital_at_entry: f64,
    pub return_frac: f64,
    /// Closed by end-of-data liquidation rather than a signal.
    pub forced: bool,
}

impl Trade {
    pub fn close(
        position: &Position,
        mark: &Mark,
        exit_time: NaiveDateTime,
        exit_fee: f64,
        forced: bool,
    ) -> Self {
        let fees = position.entry_fee + exit_fee;
        let total_pnl = mark.price_pnl() + mark.funding_pnl() - fees;
        let capital_at_entry = position.net_capital_at_entry;

        Trade {
            entry_time: position.entry_time,
            exit_time,
            direction: position.direction,
            pnl_a: mark.pnl_a,
            pnl_b: mark.pnl_b,
            funding_a: mark.funding_a,
            funding_b: mark.funding_b,
            fees,
            total_pnl,
            capital_at_entry,
            return_frac: return_fraction(total_pnl, capital_at_entry),
            forced,
        }
    }

    pub fn hold_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 3600.0
    }
}

/// PnL relative to capital at entry; zero capital yields 0 rather than inf/NaN.
pub fn return_fraction(pnl: f64, capital_at_entry: f64) -> f64 {
    if capital_at_entry == 0.0 || !capital_at_entry.is_finite() {
        return 0.0;
    }
    let frac = pnl / capital_at_entry;
    if frac.is_finite() { frac } else { 0.0 }
}
