//! Data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::PairtraderError;

pub trait DataPort {
    /// The full bar series in source order. Ordering and value checks are the
    /// engine's job, not the adapter's.
    fn fetch_bars(&self) -> Result<Vec<Bar>, PairtraderError>;
}
