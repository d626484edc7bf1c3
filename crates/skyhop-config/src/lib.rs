//! Configuration for skyhop.
//!
//! Tunables for movement, health, reconciliation, networking and the world
//! persist to disk as a RON file. CLI overrides are applied via clap, and a
//! reload check reports whether the file changed on disk.

pub mod cli;
pub mod config;
pub mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, HealthConfig, MovementConfig, NetworkConfig, ReconcileConfig,
    WorldConfig,
};
pub use error::ConfigError;
