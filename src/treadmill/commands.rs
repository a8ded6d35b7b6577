//! Treadmill command interface.
//!
//! The controller never talks to hardware directly; it drives whatever
//! implements [`TreadmillCommands`] (a BLE FTMS adapter, a simulator, a test double).

use thiserror::Error;

/// Errors reported by a treadmill command transport.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreadmillError {
    /// No treadmill is connected
    #[error("Treadmill not connected")]
    NotConnected,

    /// The treadmill answered but refused the command
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// Writing the command to the transport failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The treadmill did not answer in time
    #[error("Command timed out")]
    Timeout,
}

/// Commands the heart-rate controller sends to a treadmill.
///
/// Both operations resolve once the transport has completed the send. The
/// controller awaits them before updating its mirrored speed/incline.
pub trait TreadmillCommands: Send + Sync {
    /// Command a new belt speed in km/h.
    fn set_speed(
        &self,
        speed_kmh: f64,
    ) -> impl std::future::Future<Output = Result<(), TreadmillError>> + Send;

    /// Command a new inclination in percent.
    fn set_inclination(
        &self,
        incline_percent: f64,
    ) -> impl std::future::Future<Output = Result<(), TreadmillError>> + Send;
}

impl<T: TreadmillCommands> TreadmillCommands for std::sync::Arc<T> {
    fn set_speed(
        &self,
        speed_kmh: f64,
    ) -> impl std::future::Future<Output = Result<(), TreadmillError>> + Send {
        (**self).set_speed(speed_kmh)
    }

    fn set_inclination(
        &self,
        incline_percent: f64,
    ) -> impl std::future::Future<Output = Result<(), TreadmillError>> + Send {
        (**self).set_inclination(incline_percent)
    }
}
