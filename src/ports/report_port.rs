//! Report output port trait.

use crate::domain::analysis::DivergenceEvent;
use crate::domain::error::PairtraderError;
use crate::domain::position::Trade;
use crate::domain::sweep::SweepRow;
use crate::domain::timeline::Timeline;

/// Port for writing backtest, sweep and analysis results.
pub trait ReportPort {
    fn write_timeline(&self, timeline: &Timeline, output_path: &str) -> Result<(), PairtraderError>;

    fn write_trades(&self, trades: &[Trade], output_path: &str) -> Result<(), PairtraderError>;

    fn write_sweep(&self, rows: &[SweepRow], output_path: &str) -> Result<(), PairtraderError>;

    fn write_events(
        &self,
        events: &[DivergenceEvent],
        output_path: &str,
    ) -> Result<(), PairtraderError>;
}
