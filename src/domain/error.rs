//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for pairtrader.
#[derive(Debug, thiserror::Error)]
pub enum PairtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid bar {index} at {timestamp}: {field} {reason}")]
    InvalidBar {
        index: usize,
        timestamp: NaiveDateTime,
        field: String,
        reason: String,
    },

    #[error("bar {index}: timestamp {current} does not follow {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("input series is empty")]
    EmptySeries,

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("worker pool error: {reason}")]
    WorkerPool { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PairtraderError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        PairtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&PairtraderError> for std::process::ExitCode {
    fn from(err: &PairtraderError) -> Self {
        let code: u8 = match err {
            PairtraderError::Io(_) | PairtraderError::WorkerPool { .. } => 1,
            PairtraderError::ConfigParse { .. }
            | PairtraderError::ConfigMissing { .. }
            | PairtraderError::ConfigInvalid { .. } => 2,
            PairtraderError::InvalidBar { .. }
            | PairtraderError::NonMonotonicTimestamp { .. }
            | PairtraderError::EmptySeries
            | PairtraderError::Data { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
