//! CSV file data adapter.
//!
//! Reads one headered file of aligned bars:
//! `timestamp, price_a, price_b, [signal], [fidx_a_long, fidx_a_short, fidx_b_long, fidx_b_short]`.

use crate::domain::bar::{Bar, FundingIndices};
use crate::domain::error::PairtraderError;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDateTime};
use std::path::PathBuf;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    path: PathBuf,
    derived_signal: bool,
}

struct Columns {
    timestamp: usize,
    price_a: usize,
    price_b: usize,
    signal: Option<usize>,
    a_long: Option<usize>,
    a_short: Option<usize>,
    b_long: Option<usize>,
    b_short: Option<usize>,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            derived_signal: false,
        }
    }

    /// When set, the `signal` column is optional and left at 0; the caller
    /// derives signals from prices afterwards.
    pub fn with_derived_signal(mut self, derived: bool) -> Self {
        self.derived_signal = derived;
        self
    }

    fn columns(&self, headers: &csv::StringRecord) -> Result<Columns, PairtraderError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| PairtraderError::Data {
                reason: format!("{}: missing column '{}'", self.path.display(), name),
            })
        };

        let signal = if self.derived_signal {
            find("signal")
        } else {
            Some(require("signal")?)
        };

        Ok(Columns {
            timestamp: require("timestamp")?,
            price_a: require("price_a")?,
            price_b: require("price_b")?,
            signal,
            a_long: find("fidx_a_long"),
            a_short: find("fidx_a_short"),
            b_long: find("fidx_b_long"),
            b_short: find("fidx_b_short"),
        })
    }
}

/// Epoch milliseconds or one of the accepted datetime layouts.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn cell<'r>(record: &'r csv::StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or("").trim()
}

fn parse_price(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, PairtraderError> {
    let raw = cell(record, index);
    raw.parse::<f64>().map_err(|_| PairtraderError::Data {
        reason: format!("line {line}: invalid {name} value '{raw}'"),
    })
}

fn parse_funding(record: &csv::StringRecord, index: Option<usize>, line: u64) -> Result<f64, PairtraderError> {
    let Some(index) = index else {
        return Ok(0.0);
    };
    let raw = cell(record, index);
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>().map_err(|_| PairtraderError::Data {
        reason: format!("line {line}: invalid funding index '{raw}'"),
    })
}

fn parse_signal(record: &csv::StringRecord, index: Option<usize>, line: u64) -> Result<i8, PairtraderError> {
    let Some(index) = index else {
        return Ok(0);
    };
    let raw = cell(record, index);
    if raw.is_empty() {
        return Ok(0);
    }
    // exports sometimes write signals as floats ("1.0")
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && (i8::MIN as f64..=i8::MAX as f64).contains(&v) => Ok(v as i8),
        _ => Err(PairtraderError::Data {
            reason: format!("line {line}: invalid signal value '{raw}'"),
        }),
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self) -> Result<Vec<Bar>, PairtraderError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| PairtraderError::Data {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let headers = rdr
            .headers()
            .map_err(|e| PairtraderError::Data {
                reason: format!("CSV header error: {}", e),
            })?
            .clone();
        let cols = self.columns(&headers)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| PairtraderError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let raw_ts = cell(&record, cols.timestamp);
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| PairtraderError::Data {
                reason: format!("line {line}: invalid timestamp '{raw_ts}'"),
            })?;

            let funding = FundingIndices {
                a_long: parse_funding(&record, cols.a_long, line)?,
                a_short: parse_funding(&record, cols.a_short, line)?,
                b_long: parse_funding(&record, cols.b_long, line)?,
                b_short: parse_funding(&record, cols.b_short, line)?,
            };

            bars.push(
                Bar::new(
                    timestamp,
                    parse_price(&record, cols.price_a, "price_a", line)?,
                    parse_price(&record, cols.price_b, "price_b", line)?,
                    parse_signal(&record, cols.signal, line)?,
                )
                .with_funding(funding),
            );
        }

        tracing::info!(path = %self.path.display(), bars = bars.len(), "loaded bars");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bars.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 17)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn fetch_bars_reads_all_columns() {
        let (_dir, path) = write_csv(
            "timestamp,price_a,price_b,signal,fidx_a_long,fidx_a_short,fidx_b_long,fidx_b_short\n\
             2025-02-17 00:00:00,100.5,10.1,1,0.1,0.2,0.3,0.4\n\
             2025-02-17T00:15:00,101.0,10.0,-1,,,,\n",
        );
        let bars = CsvAdapter::new(path).fetch_bars().unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, ts(0, 0));
        assert_eq!(bars[0].price_a, 100.5);
        assert_eq!(bars[0].price_b, 10.1);
        assert_eq!(bars[0].signal, 1);
        assert_eq!(bars[0].funding.b_short, 0.4);
        assert_eq!(bars[1].timestamp, ts(0, 15));
        assert_eq!(bars[1].signal, -1);
        assert_eq!(bars[1].funding, FundingIndices::default());
    }

    #[test]
    fn epoch_millis_timestamps() {
        // 2025-02-17 00:00:00 UTC
        assert_eq!(parse_timestamp("1739750400000"), Some(ts(0, 0)));
        assert_eq!(parse_timestamp("2025-02-17 00:15:00"), Some(ts(0, 15)));
        assert_eq!(parse_timestamp("17/02/2025"), None);
    }

    #[test]
    fn columns_matched_by_header_name() {
        let (_dir, path) = write_csv("signal,price_b,timestamp,price_a\n1.0,2,2025-02-17 00:00:00,3\n");
        let bars = CsvAdapter::new(path).fetch_bars().unwrap();
        assert_eq!(bars[0].price_a, 3.0);
        assert_eq!(bars[0].price_b, 2.0);
        assert_eq!(bars[0].signal, 1);
    }

    #[test]
    fn missing_signal_column_is_an_error_unless_derived() {
        let content = "timestamp,price_a,price_b\n2025-02-17 00:00:00,3,2\n";
        let (_dir, path) = write_csv(content);

        let err = CsvAdapter::new(path.clone()).fetch_bars().unwrap_err();
        assert!(matches!(err, PairtraderError::Data { ref reason } if reason.contains("signal")));

        let bars = CsvAdapter::new(path).with_derived_signal(true).fetch_bars().unwrap();
        assert_eq!(bars[0].signal, 0);
    }

    #[test]
    fn rows_kept_in_file_order() {
        let (_dir, path) = write_csv(
            "timestamp,price_a,price_b,signal\n\
             2025-02-17 00:15:00,1,1,0\n\
             2025-02-17 00:00:00,1,1,0\n",
        );
        let bars = CsvAdapter::new(path).fetch_bars().unwrap();
        assert_eq!(bars[0].timestamp, ts(0, 15));
        assert_eq!(bars[1].timestamp, ts(0, 0));
    }

    #[test]
    fn bad_price_reports_line() {
        let (_dir, path) = write_csv("timestamp,price_a,price_b,signal\n2025-02-17 00:00:00,abc,1,0\n");
        let err = CsvAdapter::new(path).fetch_bars().unwrap_err();
        assert!(matches!(err, PairtraderError::Data { ref reason } if reason.contains("price_a")));
    }

    #[test]
    fn fractional_signal_rejected() {
        let (_dir, path) = write_csv("timestamp,price_a,price_b,signal\n2025-02-17 00:00:00,1,1,0.5\n");
        assert!(CsvAdapter::new(path).fetch_bars().is_err());
    }

    #[test]
    fn missing_file_is_data_error() {
        let err = CsvAdapter::new(PathBuf::from("/nonexistent/bars.csv"))
            .fetch_bars()
            .unwrap_err();
        assert!(matches!(err, PairtraderError::Data { .. }));
    }
}
