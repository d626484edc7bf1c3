//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Shared command-line arguments.
///
/// CLI values override settings loaded from `config.ron`. Binaries flatten
/// this into their own parser.
#[derive(Args, Debug, Clone, Default)]
pub struct CliArgs {
    /// Display name for avatars owned by this peer.
    #[arg(long)]
    pub nickname: Option<String>,

    /// Physics tick rate in Hz.
    #[arg(long)]
    pub physics_tick_rate: Option<u32>,

    /// Snapshot send rate in Hz.
    #[arg(long)]
    pub net_tick_rate: Option<u32>,

    /// Clamp health at zero instead of letting it go negative.
    #[arg(long)]
    pub clamp_health_floor: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref name) = args.nickname {
            self.network.nickname = name.clone();
        }
        if let Some(hz) = args.physics_tick_rate {
            self.network.physics_tick_rate = hz;
        }
        if let Some(hz) = args.net_tick_rate {
            self.network.net_tick_rate = hz;
        }
        if let Some(clamp) = args.clamp_health_floor {
            self.health.clamp_floor = clamp;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
