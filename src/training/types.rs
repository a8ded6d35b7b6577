//! Heart-rate training configuration, errors and events.

use crate::training::policy::{Axis, CycleOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lowest heart rate accepted from a sensor (bpm).
pub const MIN_VALID_HEART_RATE: f64 = 25.0;

/// Highest heart rate accepted from a sensor (bpm).
pub const MAX_VALID_HEART_RATE: f64 = 250.0;

/// Inclusive heart-rate range the controller steers toward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetZone {
    /// Lower bound in bpm
    pub min: f64,
    /// Upper bound in bpm
    pub max: f64,
}

impl TargetZone {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, bpm: f64) -> bool {
        bpm >= self.min && bpm <= self.max
    }
}

/// Clamping bounds for a commanded value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
}

impl Limits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the limits. Never panics; `min` wins if the bounds cross.
    pub fn clamp(&self, value: f64) -> f64 {
        self.min.max(value.min(self.max))
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Speed step sizes. Incline steps are twice the selected speed step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentSteps {
    /// Step for corrections within tolerance (km/h)
    pub small: f64,
    /// Step for corrections beyond tolerance (km/h)
    pub large: f64,
}

impl Default for AdjustmentSteps {
    fn default() -> Self {
        Self {
            small: 0.2,
            large: 0.5,
        }
    }
}

/// Intervals between evaluation cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delays {
    /// Delay after a small or no correction, in milliseconds
    pub small_ms: u64,
    /// Delay after a large correction, in milliseconds
    pub large_ms: u64,
}

impl Delays {
    /// Sub-millisecond remainders round up, so only a zero duration maps to 0 ms.
    pub fn from_durations(small: Duration, large: Duration) -> Self {
        Self {
            small_ms: whole_millis(small),
            large_ms: whole_millis(large),
        }
    }

    pub fn small(&self) -> Duration {
        Duration::from_millis(self.small_ms)
    }

    pub fn large(&self) -> Duration {
        Duration::from_millis(self.large_ms)
    }
}

/// Milliseconds in `duration`, rounded up and saturating at `u64::MAX`.
fn whole_millis(duration: Duration) -> u64 {
    let partial = u128::from(duration.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(duration.as_millis() + partial).unwrap_or(u64::MAX)
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            small_ms: 5_000,
            large_ms: 10_000,
        }
    }
}

/// Complete controller configuration.
///
/// Every field can be changed while the controller runs; changes take effect
/// at the start of the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Heart-rate zone to hold
    pub target_zone: TargetZone,
    /// Distance beyond the zone (bpm) that makes a correction large
    pub tolerance: f64,
    /// Allowed belt speed in km/h
    pub speed_limits: Limits,
    /// Allowed incline in percent
    pub incline_limits: Limits,
    /// Speed step sizes
    pub adjustment_steps: AdjustmentSteps,
    /// Cycle intervals
    pub delays: Delays,
    /// Whether the controller may change speed
    pub speed_control: bool,
    /// Whether the controller may change incline
    pub incline_control: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_zone: TargetZone::default(),
            tolerance: 5.0,
            speed_limits: Limits::new(1.0, 20.0),
            incline_limits: Limits::new(0.0, 15.0),
            adjustment_steps: AdjustmentSteps::default(),
            delays: Delays::default(),
            speed_control: false,
            incline_control: false,
        }
    }
}

impl TrainingConfig {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), TrainingError> {
        check_range("target zone", self.target_zone.min, self.target_zone.max)?;
        check_non_negative("tolerance", self.tolerance)?;
        check_range("speed limits", self.speed_limits.min, self.speed_limits.max)?;
        check_range(
            "incline limits",
            self.incline_limits.min,
            self.incline_limits.max,
        )?;
        check_steps(&self.adjustment_steps)?;
        check_delays(&self.delays)
    }

    /// Whether at least one axis may be adjusted.
    pub fn any_control_enabled(&self) -> bool {
        self.speed_control || self.incline_control
    }
}

pub(crate) fn check_finite(what: &'static str, value: f64) -> Result<(), TrainingError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TrainingError::InvalidValue { what, value })
    }
}

pub(crate) fn check_non_negative(what: &'static str, value: f64) -> Result<(), TrainingError> {
    check_finite(what, value)?;
    if value < 0.0 {
        return Err(TrainingError::InvalidValue { what, value });
    }
    Ok(())
}

pub(crate) fn check_range(what: &'static str, min: f64, max: f64) -> Result<(), TrainingError> {
    check_finite(what, min)?;
    check_finite(what, max)?;
    if min > max {
        return Err(TrainingError::InvalidRange { what, min, max });
    }
    Ok(())
}

pub(crate) fn check_steps(steps: &AdjustmentSteps) -> Result<(), TrainingError> {
    check_non_negative("small adjustment step", steps.small)?;
    check_non_negative("large adjustment step", steps.large)
}

pub(crate) fn check_delays(delays: &Delays) -> Result<(), TrainingError> {
    if delays.small_ms == 0 {
        return Err(TrainingError::InvalidValue {
            what: "small delay",
            value: 0.0,
        });
    }
    if delays.large_ms == 0 {
        return Err(TrainingError::InvalidValue {
            what: "large delay",
            value: 0.0,
        });
    }
    Ok(())
}

/// Errors returned by the heart-rate controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrainingError {
    /// Heart-rate sample outside the plausible range or not a number
    #[error("Invalid heart rate sample: {0}")]
    InvalidSample(f64),

    /// A `{min, max}` pair with `min > max`
    #[error("Invalid {what}: min {min} is greater than max {max}")]
    InvalidRange {
        what: &'static str,
        min: f64,
        max: f64,
    },

    /// A single configuration value that is not finite or out of range
    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },

    /// `start` was called outside a Tokio runtime
    #[error("No async runtime available to schedule the control cycle")]
    NoRuntime,
}

/// Events broadcast by the controller.
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    /// The cycle was started
    Started,
    /// The cycle was stopped by the owner
    Stopped,
    /// A heart-rate sample failed validation and was dropped
    SampleRejected { value: f64 },
    /// A command reached the treadmill and the mirrored value was updated
    AdjustmentApplied {
        axis: Axis,
        value: f64,
        at: DateTime<Utc>,
    },
    /// A command failed; the mirrored value is unchanged
    DispatchFailed {
        axis: Axis,
        value: f64,
        error: String,
    },
    /// One evaluation finished
    CycleCompleted {
        outcome: CycleOutcome,
        /// Whether a further cycle was scheduled
        rescheduled: bool,
    },
}
