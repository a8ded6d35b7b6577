//! Treadmill side: the command interface the controller drives, an FTMS
//! adapter and an in-memory simulator.

pub mod commands;
pub mod ftms;
pub mod simulated;

pub use commands::{TreadmillCommands, TreadmillError};
pub use ftms::{
    parse_heart_rate_measurement, ControlPointResponse, ControlPointResult, ControlPointWriter,
    FtmsTreadmill, HeartRateMeasurement,
};
pub use simulated::{HeartRateModel, HeartRateModelSettings, SimulatedTreadmill, TreadmillCommand};
