//! Aligned two-instrument bar and input series contract.
//!
//! A [`Bar`] carries both instrument prices, the already-lagged trade signal
//! and the four cumulative funding indices. The series handed to the engine
//! must be strictly increasing in time; [`validate_series`] enforces that
//! before any simulation starts.

use chrono::NaiveDateTime;

use super::error::PairtraderError;

/// Basket direction. `Long` means long A / short B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Map a signal to a direction; `0` is flat and has none.
    pub fn from_signal(signal: i8) -> Option<Self> {
        match signal {
            s if s > 0 => Some(Direction::Long),
            s if s < 0 => Some(Direction::Short),
            _ => None,
        }
    }

    pub fn signal(self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn sign(self) -> f64 {
        f64::from(self.signal())
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Cumulative funding indices, quote per contract.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FundingIndices {
    pub a_long: f64,
    pub a_short: f64,
    pub b_long: f64,
    pub b_short: f64,
}

impl FundingIndices {
    /// Index accrued by leg A when the basket points `direction`.
    pub fn leg_a(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.a_long,
            Direction::Short => self.a_short,
        }
    }

    /// Index accrued by leg B, which always trades opposite the basket.
    pub fn leg_b(&self, direction: Direction) -> f64 {
        match direction.opposite() {
            Direction::Long => self.b_long,
            Direction::Short => self.b_short,
        }
    }

    fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("fidx_a_long", self.a_long),
            ("fidx_a_short", self.a_short),
            ("fidx_b_long", self.b_long),
            ("fidx_b_short", self.b_short),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub price_a: f64,
    pub price_b: f64,
    /// Lagged trading decision in {-1, 0, 1}.
    pub signal: i8,
    pub funding: FundingIndices,
}

impl Bar {
    pub fn new(timestamp: NaiveDateTime, price_a: f64, price_b: f64, signal: i8) -> Self {
        Bar {
            timestamp,
            price_a,
            price_b,
            signal,
            funding: FundingIndices::default(),
        }
    }

    pub fn with_funding(mut self, funding: FundingIndices) -> Self {
        self.funding = funding;
        self
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::from_signal(self.signal)
    }
}

/// Check the input contract: non-empty, sane fields, strictly increasing timestamps.
pub fn validate_series(bars: &[Bar]) -> Result<(), PairtraderError> {
    if bars.is_empty() {
        return Err(PairtraderError::EmptySeries);
    }

    let mut previous: Option<NaiveDateTime> = None;
    for (index, bar) in bars.iter().enumerate() {
        let invalid = |field: &str, reason: &str| PairtraderError::InvalidBar {
            index,
            timestamp: bar.timestamp,
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if let Some(prev) = previous {
            if bar.timestamp <= prev {
                return Err(PairtraderError::NonMonotonicTimestamp {
                    index,
                    previous: prev,
                    current: bar.timestamp,
                });
            }
        }
        previous = Some(bar.timestamp);

        for (field, price) in [("price_a", bar.price_a), ("price_b", bar.price_b)] {
            if !price.is_finite() || price <= 0.0 {
                return Err(invalid(field, "must be a positive finite price"));
            }
        }

        if !(-1..=1).contains(&bar.signal) {
            return Err(invalid("signal", "must be -1, 0 or 1"));
        }

        for (field, value) in bar.funding.fields() {
            if !value.is_finite() {
                return Err(invalid(field, "must be finite"));
            }
        }
    }

    Ok(())
}
