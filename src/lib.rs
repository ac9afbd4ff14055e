//! Intraday quote signal scanner
//!
//! Loads quote snapshots, computes indicators per instrument, classifies each
//! instrument into a signal category and renders a grouped report.

pub mod config;
pub mod indicators;
pub mod loader;
pub mod market_data;
pub mod notify;
pub mod report;
pub mod scanner;
pub mod signals;
pub mod source;
pub mod stats;
