//! Storage module for application configuration.

pub mod config;

pub use config::{AppConfig, ConfigError, SimulationSettings};
