//! In-memory treadmill and heart-rate response model.
//!
//! Used by the demo binary and the tests in place of real hardware.

use crate::treadmill::commands::{TreadmillCommands, TreadmillError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A command accepted by the simulated treadmill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreadmillCommand {
    SetSpeed(f64),
    SetInclination(f64),
}

#[derive(Debug, Default)]
struct SimulatedState {
    speed_kmh: f64,
    incline_percent: f64,
    accepted: Vec<TreadmillCommand>,
    failed_attempts: u32,
    failing: bool,
    latency: Duration,
}

/// Simulated treadmill with configurable latency and failure injection.
///
/// Clones share state, so a test can keep one handle for inspection while the
/// controller owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTreadmill {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedTreadmill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command waits `latency` before completing.
    pub fn with_latency(latency: Duration) -> Self {
        let treadmill = Self::new();
        treadmill.lock().latency = latency;
        treadmill
    }

    /// Make subsequent commands fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Commands accepted so far, in order.
    pub fn commands(&self) -> Vec<TreadmillCommand> {
        self.lock().accepted.clone()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.lock().failed_attempts
    }

    pub fn speed(&self) -> f64 {
        self.lock().speed_kmh
    }

    pub fn incline(&self) -> f64 {
        self.lock().incline_percent
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn apply(&self, command: TreadmillCommand) -> Result<(), TreadmillError> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.failing {
            state.failed_attempts += 1;
            return Err(TreadmillError::WriteFailed(
                "simulated link failure".to_string(),
            ));
        }

        match command {
            TreadmillCommand::SetSpeed(speed) => state.speed_kmh = speed,
            TreadmillCommand::SetInclination(incline) => state.incline_percent = incline,
        }
        state.accepted.push(command);
        tracing::trace!("Simulated treadmill accepted {:?}", command);
        Ok(())
    }
}

impl TreadmillCommands for SimulatedTreadmill {
    async fn set_speed(&self, speed_kmh: f64) -> Result<(), TreadmillError> {
        self.apply(TreadmillCommand::SetSpeed(speed_kmh)).await
    }

    async fn set_inclination(&self, incline_percent: f64) -> Result<(), TreadmillError> {
        self.apply(TreadmillCommand::SetInclination(incline_percent))
            .await
    }
}

/// Parameters of the simulated heart-rate response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateModelSettings {
    /// Heart rate standing on a stopped belt
    pub resting_bpm: f64,
    /// Steady-state increase per km/h of belt speed
    pub bpm_per_kmh: f64,
    /// Steady-state increase per percent of incline
    pub bpm_per_incline_percent: f64,
    /// Time constant of the exponential response in seconds
    pub time_constant_secs: f64,
}

impl Default for HeartRateModelSettings {
    fn default() -> Self {
        Self {
            resting_bpm: 70.0,
            bpm_per_kmh: 9.0,
            bpm_per_incline_percent: 3.5,
            time_constant_secs: 30.0,
        }
    }
}

/// First-order heart-rate response to treadmill load.
///
/// The heart rate relaxes exponentially toward a steady state that is linear in
/// speed and incline.
#[derive(Debug, Clone)]
pub struct HeartRateModel {
    settings: HeartRateModelSettings,
    current_bpm: f64,
}

impl HeartRateModel {
    pub fn new(settings: HeartRateModelSettings) -> Self {
        Self {
            current_bpm: settings.resting_bpm,
            settings,
        }
    }

    /// Steady-state heart rate for the given load.
    pub fn steady_state(&self, speed_kmh: f64, incline_percent: f64) -> f64 {
        self.settings.resting_bpm
            + self.settings.bpm_per_kmh * speed_kmh
            + self.settings.bpm_per_incline_percent * incline_percent
    }

    /// Advance the model by `dt` and return the new heart rate.
    pub fn step(&mut self, speed_kmh: f64, incline_percent: f64, dt: Duration) -> f64 {
        let target = self.steady_state(speed_kmh, incline_percent);
        let tau = self.settings.time_constant_secs.max(f64::EPSILON);
        let alpha = 1.0 - (-dt.as_secs_f64() / tau).exp();
        self.current_bpm += alpha * (target - self.current_bpm);
        self.current_bpm
    }

    pub fn current_bpm(&self) -> f64 {
        self.current_bpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_treadmill_records_commands() {
        let treadmill = SimulatedTreadmill::new();
        treadmill.set_speed(6.5).await.unwrap();
        treadmill.set_inclination(2.0).await.unwrap();

        assert_eq!(treadmill.speed(), 6.5);
        assert_eq!(treadmill.incline(), 2.0);
        assert_eq!(
            treadmill.commands(),
            vec![
                TreadmillCommand::SetSpeed(6.5),
                TreadmillCommand::SetInclination(2.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_simulated_treadmill_failure_injection() {
        let treadmill = SimulatedTreadmill::new();
        treadmill.set_failing(true);

        assert!(treadmill.set_speed(6.5).await.is_err());
        assert_eq!(treadmill.failed_attempts(), 1);
        assert!(treadmill.commands().is_empty());
        assert_eq!(treadmill.speed(), 0.0);
    }

    #[test]
    fn test_heart_rate_model_converges() {
        let mut model = HeartRateModel::new(HeartRateModelSettings::default());
        assert_eq!(model.current_bpm(), 70.0);

        // 10 km/h, flat: steady state is 160 bpm
        for _ in 0..600 {
            model.step(10.0, 0.0, Duration::from_secs(1));
        }
        assert!((model.current_bpm() - 160.0).abs() < 0.5);
    }

    #[test]
    fn test_heart_rate_model_rises_monotonically() {
        let mut model = HeartRateModel::new(HeartRateModelSettings::default());
        let first = model.step(8.0, 2.0, Duration::from_secs(1));
        let second = model.step(8.0, 2.0, Duration::from_secs(1));
        assert!(first > 70.0);
        assert!(second > first);
    }
}
