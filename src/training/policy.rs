//! Step-function decision policy.
//!
//! Given a snapshot of the controller taken at the start of a cycle, decide
//! whether intensity must change, by how much, on which axis, and how long to
//! wait before the next cycle. Pure: no I/O, no clock.

use crate::training::types::{TargetZone, TrainingConfig};
use std::time::Duration;

/// Which way intensity has to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Increase => 1.0,
            Direction::Decrease => -1.0,
        }
    }
}

/// Size of a correction relative to the tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magnitude {
    Small,
    Large,
}

/// A needed change in intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub direction: Direction,
    pub magnitude: Magnitude,
}

/// Treadmill axis a command acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Speed,
    Incline,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Speed => write!(f, "speed"),
            Axis::Incline => write!(f, "incline"),
        }
    }
}

/// A command to send this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub axis: Axis,
    /// New clamped target for the axis
    pub value: f64,
}

/// Everything a cycle decides on, captured under one lock.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput {
    pub config: TrainingConfig,
    /// Mean of the sample window, `None` without data
    pub average: Option<f64>,
    pub current_speed: f64,
    pub current_incline: f64,
}

/// Result of evaluating one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// No axis enabled. The cycle chain ends here.
    Idle,
    /// No samples yet; try again after the small delay.
    AwaitingData { next_delay: Duration },
    /// A decision was made on the current average.
    Evaluated {
        average: f64,
        correction: Option<Correction>,
        adjustment: Option<Adjustment>,
        next_delay: Duration,
    },
}

impl CycleOutcome {
    /// Delay before the next cycle, `None` when the chain ends.
    pub fn next_delay(&self) -> Option<Duration> {
        match self {
            CycleOutcome::Idle => None,
            CycleOutcome::AwaitingData { next_delay } => Some(*next_delay),
            CycleOutcome::Evaluated { next_delay, .. } => Some(*next_delay),
        }
    }

    pub fn adjustment(&self) -> Option<Adjustment> {
        match self {
            CycleOutcome::Evaluated { adjustment, .. } => *adjustment,
            _ => None,
        }
    }
}

/// Compare an average against the zone.
///
/// Returns `None` inside the zone (bounds inclusive). A correction is large
/// when the average lies more than `tolerance` beyond the violated bound.
pub fn classify(average: f64, zone: &TargetZone, tolerance: f64) -> Option<Correction> {
    let (direction, large) = if average < zone.min {
        (Direction::Increase, average < zone.min - tolerance)
    } else if average > zone.max {
        (Direction::Decrease, average > zone.max + tolerance)
    } else {
        return None;
    };

    Some(Correction {
        direction,
        magnitude: if large {
            Magnitude::Large
        } else {
            Magnitude::Small
        },
    })
}

/// Decide what a cycle should do.
pub fn evaluate(input: &CycleInput) -> CycleOutcome {
    let config = &input.config;

    if !config.any_control_enabled() {
        return CycleOutcome::Idle;
    }

    let Some(average) = input.average else {
        return CycleOutcome::AwaitingData {
            next_delay: config.delays.small(),
        };
    };

    let correction = classify(average, &config.target_zone, config.tolerance);

    // The large delay follows any large correction, even one that ends up
    // sending nothing because the axis is already at its limit.
    let next_delay = match correction {
        Some(Correction {
            magnitude: Magnitude::Large,
            ..
        }) => config.delays.large(),
        _ => config.delays.small(),
    };

    let adjustment = correction.and_then(|correction| plan_adjustment(input, correction));

    CycleOutcome::Evaluated {
        average,
        correction,
        adjustment,
        next_delay,
    }
}

/// Pick the axis and target value. Speed takes priority; incline is only
/// touched when speed control is off, so one cycle never moves both.
fn plan_adjustment(input: &CycleInput, correction: Correction) -> Option<Adjustment> {
    let config = &input.config;
    let step = match correction.magnitude {
        Magnitude::Small => config.adjustment_steps.small,
        Magnitude::Large => config.adjustment_steps.large,
    };
    let sign = correction.direction.sign();

    let (axis, current, target) = if config.speed_control {
        let target = config.speed_limits.clamp(input.current_speed + step * sign);
        (Axis::Speed, input.current_speed, target)
    } else if config.incline_control {
        let target = config
            .incline_limits
            .clamp(input.current_incline + step * 2.0 * sign);
        (Axis::Incline, input.current_incline, target)
    } else {
        return None;
    };

    (target != current).then_some(Adjustment {
        axis,
        value: target,
    })
}
