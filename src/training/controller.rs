//! Heart-rate zone controller.
//!
//! Samples pushed by a heart-rate sensor go into a bounded window. A cycle task
//! wakes up, averages the window, asks the policy for a decision, sends at most
//! one command to the treadmill and sleeps for the delay the decision chose.

use crate::training::history::HeartRateHistory;
use crate::training::policy::{self, Adjustment, Axis, CycleInput, CycleOutcome};
use crate::training::types::{
    check_delays, check_finite, check_non_negative, check_range, check_steps, AdjustmentSteps,
    Delays, Limits, TargetZone, TrainingConfig, TrainingError, TrainingEvent,
    MAX_VALID_HEART_RATE, MIN_VALID_HEART_RATE,
};
use crate::treadmill::commands::TreadmillCommands;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tokio::task::JoinHandle;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Mutable controller state. Never locked across an await.
struct ControllerState {
    config: TrainingConfig,
    history: HeartRateHistory,
    current_speed: f64,
    current_incline: f64,
    running: bool,
    /// Bumped by every start and stop; a cycle task only continues while its
    /// epoch is current
    epoch: u64,
    /// Task of the current epoch
    cycle_task: Option<JoinHandle<()>>,
    /// Epoch of the cycle currently evaluating or dispatching
    evaluating_epoch: Option<u64>,
}

struct Shared<C> {
    commands: C,
    state: Mutex<ControllerState>,
    /// Held for a whole evaluation including dispatch, so cycles never overlap
    cycle_gate: TokioMutex<()>,
    event_tx: broadcast::Sender<TrainingEvent>,
}

impl<C: TreadmillCommands> Shared<C> {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_event(&self, event: TrainingEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Send one command and mirror it once the treadmill has taken it.
    ///
    /// Failures are logged and reported as events; the mirrored value stays
    /// where it was so the next cycle decides from the last confirmed state.
    async fn dispatch(&self, adjustment: Adjustment) {
        let Adjustment { axis, value } = adjustment;

        let result = match axis {
            Axis::Speed => self.commands.set_speed(value).await,
            Axis::Incline => self.commands.set_inclination(value).await,
        };

        match result {
            Ok(()) => {
                {
                    let mut state = self.lock_state();
                    match axis {
                        Axis::Speed => state.current_speed = value,
                        Axis::Incline => state.current_incline = value,
                    }
                }
                tracing::info!("Treadmill {} set to {:.2}", axis, value);
                self.send_event(TrainingEvent::AdjustmentApplied {
                    axis,
                    value,
                    at: Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!("Failed to set treadmill {} to {:.2}: {}", axis, value, e);
                self.send_event(TrainingEvent::DispatchFailed {
                    axis,
                    value,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// The cycle task for one epoch.
async fn run_cycles<C: TreadmillCommands + 'static>(shared: Arc<Shared<C>>, epoch: u64) {
    let mut delay = Duration::ZERO;

    loop {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let gate = shared.cycle_gate.lock().await;

        let input = {
            let mut state = shared.lock_state();
            if state.epoch != epoch {
                return;
            }
            state.evaluating_epoch = Some(epoch);
            CycleInput {
                config: state.config,
                average: state.history.average(),
                current_speed: state.current_speed,
                current_incline: state.current_incline,
            }
        };

        let outcome = policy::evaluate(&input);
        log_outcome(&outcome);

        if let Some(adjustment) = outcome.adjustment() {
            shared.dispatch(adjustment).await;
        }

        let next_delay = {
            let mut state = shared.lock_state();
            if state.evaluating_epoch == Some(epoch) {
                state.evaluating_epoch = None;
            }

            if state.epoch != epoch {
                tracing::debug!("Cycle finished after stop; not rescheduling");
                None
            } else if let Some(next) = outcome.next_delay() {
                Some(next)
            } else {
                state.running = false;
                state.cycle_task = None;
                None
            }
        };

        drop(gate);

        shared.send_event(TrainingEvent::CycleCompleted {
            outcome,
            rescheduled: next_delay.is_some(),
        });

        match next_delay {
            Some(next) => delay = next,
            None => return,
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Idle => {
            tracing::info!("Speed and incline control both disabled; training idle");
        }
        CycleOutcome::AwaitingData { next_delay } => {
            tracing::debug!("No heart rate data yet, retrying in {:?}", next_delay);
        }
        CycleOutcome::Evaluated {
            average,
            correction,
            next_delay,
            ..
        } => {
            tracing::debug!(
                "Average heart rate {:.1} bpm, correction {:?}, next cycle in {:?}",
                average,
                correction,
                next_delay
            );
        }
    }
}

/// Keeps heart rate inside a target zone by stepping treadmill speed or incline.
///
/// Configuration setters may be called at any time; a running cycle works on a
/// snapshot taken when it woke, so changes apply from the next cycle on.
/// The sample window and the mirrored speed/incline survive `stop`/`start`.
pub struct HeartRateController<C: TreadmillCommands + 'static> {
    shared: Arc<Shared<C>>,
}

impl<C: TreadmillCommands + 'static> HeartRateController<C> {
    /// Create a controller with default configuration.
    pub fn new(commands: C) -> Self {
        Self::build(commands, TrainingConfig::default())
    }

    /// Create a controller with the given configuration.
    pub fn with_config(commands: C, config: TrainingConfig) -> Result<Self, TrainingError> {
        config.validate()?;
        Ok(Self::build(commands, config))
    }

    fn build(commands: C, config: TrainingConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                commands,
                state: Mutex::new(ControllerState {
                    config,
                    history: HeartRateHistory::default(),
                    current_speed: 0.0,
                    current_incline: 0.0,
                    running: false,
                    epoch: 0,
                    cycle_task: None,
                    evaluating_epoch: None,
                }),
                cycle_gate: TokioMutex::new(()),
                event_tx,
            }),
        }
    }

    /// Push a heart-rate reading from the sensor.
    ///
    /// Readings that are not finite or fall outside
    /// [`MIN_VALID_HEART_RATE`]..=[`MAX_VALID_HEART_RATE`] are dropped.
    pub fn on_heart_rate_changed(&self, bpm: f64) -> Result<(), TrainingError> {
        if !bpm.is_finite() || !(MIN_VALID_HEART_RATE..=MAX_VALID_HEART_RATE).contains(&bpm) {
            tracing::warn!("Rejected heart rate sample: {}", bpm);
            self.shared
                .send_event(TrainingEvent::SampleRejected { value: bpm });
            return Err(TrainingError::InvalidSample(bpm));
        }

        self.shared.lock_state().history.push(bpm);
        tracing::trace!("Heart rate sample {} bpm", bpm);
        Ok(())
    }

    /// Mean of the sample window, `0.0` when no samples have arrived yet.
    pub fn average_heart_rate(&self) -> f64 {
        self.shared.lock_state().history.average().unwrap_or(0.0)
    }

    /// Samples currently in the window, oldest first.
    pub fn history(&self) -> Vec<f64> {
        self.shared.lock_state().history.to_vec()
    }

    /// Start the control cycle. The first evaluation runs immediately.
    ///
    /// Does nothing when already running. Must be called from within a Tokio
    /// runtime.
    pub fn start(&self) -> Result<(), TrainingError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TrainingError::NoRuntime)?;

        {
            let mut state = self.shared.lock_state();
            if state.running {
                tracing::debug!("Heart rate training already running");
                return Ok(());
            }

            state.running = true;
            state.epoch = state.epoch.wrapping_add(1);
            let epoch = state.epoch;
            state.cycle_task = Some(runtime.spawn(run_cycles(Arc::clone(&self.shared), epoch)));
        }

        tracing::info!("Heart rate training started");
        self.shared.send_event(TrainingEvent::Started);
        Ok(())
    }

    /// Stop the control cycle.
    ///
    /// A pending wake-up is cancelled. A cycle already waiting on the treadmill
    /// finishes its command but schedules nothing further.
    pub fn stop(&self) {
        let (task, in_flight) = {
            let mut state = self.shared.lock_state();
            if !state.running {
                return;
            }

            let in_flight = state.evaluating_epoch == Some(state.epoch);
            state.running = false;
            state.epoch = state.epoch.wrapping_add(1);
            (state.cycle_task.take(), in_flight)
        };

        if let Some(task) = task {
            if !in_flight {
                task.abort();
            }
        }

        tracing::info!("Heart rate training stopped");
        self.shared.send_event(TrainingEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrainingEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Current configuration.
    pub fn config(&self) -> TrainingConfig {
        self.shared.lock_state().config
    }

    /// Replace the whole configuration.
    pub fn set_config(&self, config: TrainingConfig) -> Result<(), TrainingError> {
        config.validate()?;
        self.shared.lock_state().config = config;
        tracing::debug!("Training configuration replaced");
        Ok(())
    }

    pub fn set_target_zone(&self, min: f64, max: f64) -> Result<(), TrainingError> {
        check_range("target zone", min, max)?;
        self.shared.lock_state().config.target_zone = TargetZone::new(min, max);
        tracing::debug!("Target zone set to {}-{} bpm", min, max);
        Ok(())
    }

    pub fn set_speed_limits(&self, min: f64, max: f64) -> Result<(), TrainingError> {
        check_range("speed limits", min, max)?;
        self.shared.lock_state().config.speed_limits = Limits::new(min, max);
        Ok(())
    }

    pub fn set_incline_limits(&self, min: f64, max: f64) -> Result<(), TrainingError> {
        check_range("incline limits", min, max)?;
        self.shared.lock_state().config.incline_limits = Limits::new(min, max);
        Ok(())
    }

    /// Choose which axes the controller may adjust.
    pub fn set_adjustment_methods(&self, speed: bool, incline: bool) {
        let mut state = self.shared.lock_state();
        state.config.speed_control = speed;
        state.config.incline_control = incline;
        tracing::debug!("Adjustment methods: speed={}, incline={}", speed, incline);
    }

    pub fn set_tolerance(&self, tolerance: f64) -> Result<(), TrainingError> {
        check_non_negative("tolerance", tolerance)?;
        self.shared.lock_state().config.tolerance = tolerance;
        Ok(())
    }

    pub fn set_adjustment_steps(&self, small: f64, large: f64) -> Result<(), TrainingError> {
        let steps = AdjustmentSteps { small, large };
        check_steps(&steps)?;
        self.shared.lock_state().config.adjustment_steps = steps;
        Ok(())
    }

    pub fn set_delays(&self, small: Duration, large: Duration) -> Result<(), TrainingError> {
        let delays = Delays::from_durations(small, large);
        check_delays(&delays)?;
        self.shared.lock_state().config.delays = delays;
        Ok(())
    }

    /// Tell the controller the treadmill's actual speed (km/h).
    pub fn set_current_speed(&self, speed_kmh: f64) -> Result<(), TrainingError> {
        check_finite("current speed", speed_kmh)?;
        self.shared.lock_state().current_speed = speed_kmh;
        Ok(())
    }

    /// Tell the controller the treadmill's actual incline (percent).
    pub fn set_current_incline(&self, incline_percent: f64) -> Result<(), TrainingError> {
        check_finite("current incline", incline_percent)?;
        self.shared.lock_state().current_incline = incline_percent;
        Ok(())
    }

    /// Last speed the controller commanded or was told about.
    pub fn current_speed(&self) -> f64 {
        self.shared.lock_state().current_speed
    }

    /// Last incline the controller commanded or was told about.
    pub fn current_incline(&self) -> f64 {
        self.shared.lock_state().current_incline
    }
}

impl<C: TreadmillCommands + 'static> Drop for HeartRateController<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treadmill::simulated::SimulatedTreadmill;

    #[test]
    fn test_rejects_implausible_samples() {
        let controller = HeartRateController::new(SimulatedTreadmill::new());

        assert_eq!(
            controller.on_heart_rate_changed(-10.0),
            Err(TrainingError::InvalidSample(-10.0))
        );
        assert!(controller.on_heart_rate_changed(f64::NAN).is_err());
        assert!(controller.on_heart_rate_changed(400.0).is_err());
        assert!(controller.history().is_empty());

        controller.on_heart_rate_changed(132.0).unwrap();
        assert_eq!(controller.history(), vec![132.0]);
    }

    #[test]
    fn test_average_sentinel_without_data() {
        let controller = HeartRateController::new(SimulatedTreadmill::new());
        assert_eq!(controller.average_heart_rate(), 0.0);

        for bpm in [60.0, 70.0, 80.0] {
            controller.on_heart_rate_changed(bpm).unwrap();
        }
        assert_eq!(controller.average_heart_rate(), 70.0);
    }

    #[test]
    fn test_setters_validate_and_leave_state_untouched() {
        let controller = HeartRateController::new(SimulatedTreadmill::new());
        controller.set_target_zone(120.0, 150.0).unwrap();

        assert!(controller.set_target_zone(160.0, 140.0).is_err());
        assert!(controller.set_speed_limits(f64::INFINITY, 20.0).is_err());
        assert!(controller.set_tolerance(-1.0).is_err());
        assert!(controller
            .set_delays(Duration::ZERO, Duration::from_secs(10))
            .is_err());

        let config = controller.config();
        assert_eq!(config.target_zone, TargetZone::new(120.0, 150.0));
        assert_eq!(config.tolerance, 5.0);
    }

    #[test]
    fn test_setters_apply_values() {
        let controller = HeartRateController::new(SimulatedTreadmill::new());
        controller.set_adjustment_methods(true, false);
        controller.set_adjustment_steps(0.1, 0.3).unwrap();
        controller
            .set_delays(Duration::from_secs(2), Duration::from_secs(4))
            .unwrap();
        controller.set_current_speed(6.0).unwrap();
        controller.set_current_incline(1.5).unwrap();

        let config = controller.config();
        assert!(config.speed_control);
        assert!(!config.incline_control);
        assert_eq!(config.adjustment_steps.large, 0.3);
        assert_eq!(config.delays.large(), Duration::from_secs(4));
        assert_eq!(controller.current_speed(), 6.0);
        assert_eq!(controller.current_incline(), 1.5);
    }

    #[test]
    fn test_sub_millisecond_delay_is_not_zero() {
        let controller = HeartRateController::new(SimulatedTreadmill::new());
        controller
            .set_delays(Duration::from_micros(400), Duration::from_secs(10))
            .unwrap();
        assert_eq!(controller.config().delays.small(), Duration::from_millis(1));
    }

    #[test]
    fn test_with_config_rejects_invalid_config() {
        let config = TrainingConfig {
            speed_limits: Limits::new(20.0, 1.0),
            ..Default::default()
        };
        assert!(HeartRateController::with_config(SimulatedTreadmill::new(), config).is_err());
    }

    #[test]
    fn test_start_outside_runtime() {
        let controller = HeartRateController::new(SimulatedTreadmill::new());
        assert_eq!(controller.start(), Err(TrainingError::NoRuntime));
        assert!(!controller.is_running());
    }
}
