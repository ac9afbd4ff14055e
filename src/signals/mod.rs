//! Signal Generation Module
//!
//! Pattern detectors, the weighted scorer and the coordinator that turns a
//! quote table into signal records for one cycle.

pub mod box_range;
pub mod breakout;
pub mod coordinator;
pub mod core;
pub mod crossover;
pub mod momentum;
pub mod reversal;
pub mod scoring;
pub mod trend;
pub mod volume_spike;

// Re-export core types for easy access
pub use coordinator::{BatchStats, CycleOutcome, SignalCoordinator};
pub use core::{
    ClassifierPolicy, Detection, Detector, DetectorKind, Diagnostics, SignalCategory, SignalRecord,
};
pub use scoring::{ScoreCard, WeightedScorer};
