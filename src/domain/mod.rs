//! Core domain types and logic.

pub mod bar;
pub mod signal;
pub mod position;
pub mod timeline;
pub mod backtest;
pub mod metrics;
pub mod sweep;
pub mod analysis;
pub mod config_validation;
pub mod error;
