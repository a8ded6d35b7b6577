//! TreadPace - Heart-Rate Zone Training for Smart Treadmills
//!
//! Keeps a runner's heart rate inside a target zone by periodically stepping
//! treadmill speed or incline. The controller consumes heart-rate samples from
//! any sensor feed and drives any treadmill implementing [`TreadmillCommands`].

pub mod storage;
pub mod training;
pub mod treadmill;

// Re-export commonly used types
pub use storage::config::AppConfig;
pub use training::controller::HeartRateController;
pub use training::types::{TrainingConfig, TrainingError, TrainingEvent};
pub use treadmill::commands::{TreadmillCommands, TreadmillError};
