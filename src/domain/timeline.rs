//! Per-bar snapshots produced by the accounting engine.

use chrono::NaiveDateTime;

use super::bar::Bar;
use super::position::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub price_a: f64,
    pub price_b: f64,
    /// Signal consumed on this bar (the held direction on a forced exit).
    pub signal: i8,
    pub is_entry: bool,
    pub is_exit: bool,
    /// Holdings after this bar's trades.
    pub qty_a: f64,
    pub qty_b: f64,
    /// Marks of the position held into this bar.
    pub pnl_a: f64,
    pub pnl_b: f64,
    pub funding_a: f64,
    pub funding_b: f64,
    /// Fees paid on this bar (close + open on a flip).
    pub fee: f64,
    /// `None` until the first basket is opened.
    pub equity: Option<f64>,
    pub trade: Option<Trade>,
    pub forced: bool,
}

impl Snapshot {
    pub(crate) fn blank(bar: &Bar, equity: Option<f64>) -> Self {
        Snapshot {
            timestamp: bar.timestamp,
            price_a: bar.price_a,
            price_b: bar.price_b,
            signal: bar.signal,
            is_entry: false,
            is_exit: false,
            qty_a: 0.0,
            qty_b: 0.0,
            pnl_a: 0.0,
            pnl_b: 0.0,
            funding_a: 0.0,
            funding_b: 0.0,
            fee: 0.0,
            equity,
            trade: None,
            forced: false,
        }
    }
}

/// Append-only ordered sequence of snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    snapshots: Vec<Snapshot>,
}

impl Timeline {
    pub fn with_capacity(capacity: usize) -> Self {
        Timeline {
            snapshots: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, snapshot: Snapshot) {
        debug_assert!(
            self.snapshots
                .last()
                .is_none_or(|last| last.timestamp <= snapshot.timestamp),
            "timeline must stay ordered"
        );
        self.snapshots.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Snapshots stamped `timestamp`. The last bar may have two when the run
    /// ended with a forced liquidation.
    pub fn at(&self, timestamp: NaiveDateTime) -> &[Snapshot] {
        let start = self.snapshots.partition_point(|s| s.timestamp < timestamp);
        let end = self.snapshots.partition_point(|s| s.timestamp <= timestamp);
        &self.snapshots[start..end]
    }

    pub fn exits(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter().filter(|s| s.is_exit)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter().filter(|s| s.is_entry)
    }

    /// Trade log: the closed trades carried by exit snapshots, in order.
    pub fn trades(&self) -> Vec<Trade> {
        self.exits().filter_map(|s| s.trade.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
