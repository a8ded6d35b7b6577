//! TreadPace - Heart-Rate Zone Training
//!
//! Main entry point. Runs a simulated treadmill session: a heart-rate model
//! reacts to the belt load and feeds the controller, which in turn steers the
//! simulated treadmill until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use treadpace::storage::config::load_config;
use treadpace::training::{CycleOutcome, HeartRateController, TargetZone, TrainingEvent};
use treadpace::treadmill::{HeartRateModel, SimulatedTreadmill, TreadmillCommands};

/// Zone used when the configuration does not set one.
const DEMO_ZONE: TargetZone = TargetZone {
    min: 130.0,
    max: 150.0,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TreadPace v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    let simulation = config.simulation.clone();

    let treadmill =
        SimulatedTreadmill::with_latency(Duration::from_millis(simulation.command_latency_ms));
    treadmill
        .set_speed(simulation.initial_speed_kmh)
        .await
        .context("Failed to set initial speed")?;
    treadmill
        .set_inclination(simulation.initial_incline_percent)
        .await
        .context("Failed to set initial incline")?;

    let controller = Arc::new(
        HeartRateController::with_config(treadmill.clone(), config.training)
            .context("Invalid training configuration")?,
    );
    controller.set_current_speed(simulation.initial_speed_kmh)?;
    controller.set_current_incline(simulation.initial_incline_percent)?;

    if config.training.target_zone == TargetZone::default() {
        tracing::info!(
            "No target zone configured, using {}-{} bpm",
            DEMO_ZONE.min,
            DEMO_ZONE.max
        );
        controller.set_target_zone(DEMO_ZONE.min, DEMO_ZONE.max)?;
    }
    if !config.training.any_control_enabled() {
        tracing::info!("No adjustment method configured, enabling speed control");
        controller.set_adjustment_methods(true, false);
    }

    tokio::spawn(log_events(controller.subscribe()));

    let sample_interval = Duration::from_millis(simulation.sample_interval_ms.max(1));
    let model = HeartRateModel::new(simulation.heart_rate_model);
    let feed = tokio::spawn(feed_heart_rate(
        Arc::clone(&controller),
        treadmill.clone(),
        model,
        sample_interval,
    ));

    controller.start()?;

    tracing::info!("Session running. Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    controller.stop();
    feed.abort();

    tracing::info!(
        "Final speed {:.1} km/h, incline {:.1} %, {} commands sent",
        treadmill.speed(),
        treadmill.incline(),
        treadmill.commands().len()
    );

    Ok(())
}

/// Push one simulated heart-rate sample per interval.
async fn feed_heart_rate(
    controller: Arc<HeartRateController<SimulatedTreadmill>>,
    treadmill: SimulatedTreadmill,
    mut model: HeartRateModel,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let bpm = model.step(treadmill.speed(), treadmill.incline(), interval);
        if let Err(e) = controller.on_heart_rate_changed(bpm) {
            tracing::warn!("Heart rate sample dropped: {}", e);
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<TrainingEvent>) {
    loop {
        match events.recv().await {
            Ok(TrainingEvent::CycleCompleted {
                outcome: CycleOutcome::Evaluated { average, .. },
                ..
            }) => {
                tracing::info!("Average heart rate {:.0} bpm", average);
            }
            Ok(TrainingEvent::DispatchFailed { axis, error, .. }) => {
                tracing::error!("Treadmill {} command failed: {}", axis, error);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Event logger skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
