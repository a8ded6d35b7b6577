//! Heart-rate zone training: sample window, decision policy and the
//! self-rescheduling controller.

pub mod controller;
pub mod history;
pub mod policy;
pub mod types;

pub use controller::HeartRateController;
pub use history::{HeartRateHistory, HISTORY_CAPACITY};
pub use policy::{Adjustment, Axis, Correction, CycleOutcome, Direction, Magnitude};
pub use types::{
    AdjustmentSteps, Delays, Limits, TargetZone, TrainingConfig, TrainingError, TrainingEvent,
    MAX_VALID_HEART_RATE, MIN_VALID_HEART_RATE,
};
