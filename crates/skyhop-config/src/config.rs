//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Owner-side movement tuning.
    pub movement: MovementConfig,
    /// Health, hurt window and respawn rules.
    pub health: HealthConfig,
    /// Remote-side snapshot reconciliation.
    pub reconcile: ReconcileConfig,
    /// Tick rates and the local peer's display name.
    pub network: NetworkConfig,
    /// Level-wide values injected into avatars at spawn.
    pub world: WorldConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Movement tuning for the owning peer's simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Horizontal speed at full input and full health (units/s).
    pub speed: f32,
    /// Vertical velocity applied on a jump (units/s).
    pub jump_speed: f32,
    /// Smooth-damp time constant for horizontal velocity (seconds).
    pub smoothing_time: f32,
    /// Radius of the ground-contact probe.
    pub ground_check_radius: f32,
    /// Offset of the ground probe from the body center.
    pub ground_check_offset: [f32; 2],
    /// Layer bits that count as ground.
    pub ground_layers: u32,
    /// Half extents of the avatar's body box.
    pub body_half_extents: [f32; 2],
}

/// Health and hurt window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Health on spawn and after a respawn.
    pub max_health: i32,
    /// Damage committed by the owner per injury.
    pub injury_damage: i32,
    /// Duration of one blink step in milliseconds.
    pub blink_interval_ms: u64,
    /// Number of blink steps in one hurt window.
    pub blink_steps: u32,
    /// Sprite alpha during the dimmed half of a blink.
    pub blink_alpha: f32,
    /// Clamp health at zero instead of letting it go negative.
    pub clamp_floor: bool,
    /// Falling below this height triggers a respawn.
    pub fallout_y: f32,
}

/// Remote-side reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Distance at or beyond which the displayed position snaps.
    pub snap_distance: f32,
    /// Exponential blend rate toward the target (per second).
    pub blend_rate: f32,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Display name broadcast for avatars this peer owns.
    pub nickname: String,
    /// Fixed physics tick rate (Hz).
    pub physics_tick_rate: u32,
    /// Snapshot send rate (Hz).
    pub net_tick_rate: u32,
}

/// Level-wide values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Where avatars spawn and respawn.
    pub spawn_point: [f32; 2],
    /// Vertical gravity (units/s²).
    pub gravity: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            speed: 4.0,
            jump_speed: 7.0,
            smoothing_time: 0.1,
            ground_check_radius: 0.075,
            ground_check_offset: [0.0, -0.5],
            ground_layers: 1,
            body_half_extents: [0.25, 0.5],
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_health: 100,
            injury_damage: 10,
            blink_interval_ms: 100,
            blink_steps: 10,
            blink_alpha: 0.25,
            clamp_floor: false,
            fallout_y: -8.0,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            snap_distance: 2.0,
            blend_rate: 5.0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            nickname: "Player".to_string(),
            physics_tick_rate: 50,
            net_tick_rate: 20,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            spawn_point: [0.0, 1.0],
            gravity: -9.81,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl HealthConfig {
    /// Length of one blink step.
    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }

    /// Total length of the hurt window.
    pub fn hurt_duration(&self) -> Duration {
        self.blink_interval() * self.blink_steps
    }
}

// --- Validation ---

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive and finite, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and >= 0, got {value}")))
    }
}

fn finite(field: &'static str, values: &[f32]) -> Result<(), ConfigError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite, got {values:?}")))
    }
}

impl Config {
    /// Checks that every tunable is in range. Called after every load and
    /// reload, and by binaries after CLI overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let movement = &self.movement;
        non_negative("movement.speed", movement.speed)?;
        non_negative("movement.jump_speed", movement.jump_speed)?;
        positive("movement.smoothing_time", movement.smoothing_time)?;
        positive("movement.ground_check_radius", movement.ground_check_radius)?;
        finite("movement.ground_check_offset", &movement.ground_check_offset)?;
        positive("movement.body_half_extents", movement.body_half_extents[0])?;
        positive("movement.body_half_extents", movement.body_half_extents[1])?;

        let health = &self.health;
        if health.max_health <= 0 {
            return Err(invalid("health.max_health", "must be > 0"));
        }
        if !(0..=health.max_health).contains(&health.injury_damage) {
            return Err(invalid(
                "health.injury_damage",
                format!("must be within 0..={}", health.max_health),
            ));
        }
        if health.blink_interval_ms == 0 {
            return Err(invalid("health.blink_interval_ms", "must be > 0"));
        }
        if health.blink_steps == 0 {
            return Err(invalid("health.blink_steps", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&health.blink_alpha) {
            return Err(invalid("health.blink_alpha", "must be within 0.0..=1.0"));
        }
        finite("health.fallout_y", &[health.fallout_y])?;

        positive("reconcile.snap_distance", self.reconcile.snap_distance)?;
        positive("reconcile.blend_rate", self.reconcile.blend_rate)?;

        if self.network.physics_tick_rate == 0 {
            return Err(invalid("network.physics_tick_rate", "must be > 0"));
        }
        if self.network.net_tick_rate == 0 {
            return Err(invalid("network.net_tick_rate", "must be > 0"));
        }

        finite("world.spawn_point", &self.world.spawn_point)?;
        finite("world.gravity", &[self.world.gravity])?;
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for skyhop, if one exists.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("skyhop"))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Returns `Some(new_config)` if the file on disk differs, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_health: 100"));
        assert!(ron_str.contains("snap_distance: 2.0"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(movement: (speed: 6.0), network: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.movement.speed, 6.0);
        assert_eq!(config.movement.jump_speed, 7.0);
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_hurt_duration_is_steps_times_interval() {
        let health = HealthConfig::default();
        assert_eq!(health.blink_interval(), Duration::from_millis(100));
        assert_eq!(health.hurt_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.nickname = "Ada".to_string();
        config.world.spawn_point = [3.0, 4.5];
        config.health.clamp_floor = true;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.reconcile.blend_rate = 8.0;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().reconcile.blend_rate, 8.0);
    }

    fn rejected_field(ron_str: &str) -> &'static str {
        let config: Config = ron::from_str(ron_str).unwrap();
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("{ron_str} was not rejected: {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_negative_blend_rate_rejected() {
        assert_eq!(
            rejected_field("(reconcile: (blend_rate: -5.0))"),
            "reconcile.blend_rate"
        );
        assert_eq!(
            rejected_field("(reconcile: (blend_rate: 0.0))"),
            "reconcile.blend_rate"
        );
    }

    #[test]
    fn test_non_positive_snap_distance_rejected() {
        assert_eq!(
            rejected_field("(reconcile: (snap_distance: 0.0))"),
            "reconcile.snap_distance"
        );
        assert_eq!(
            rejected_field("(reconcile: (snap_distance: -1.0))"),
            "reconcile.snap_distance"
        );
    }

    #[test]
    fn test_non_positive_smoothing_time_rejected() {
        assert_eq!(
            rejected_field("(movement: (smoothing_time: 0.0))"),
            "movement.smoothing_time"
        );
    }

    #[test]
    fn test_out_of_range_injury_damage_rejected() {
        assert_eq!(
            rejected_field("(health: (injury_damage: 2147483647))"),
            "health.injury_damage"
        );
        assert_eq!(
            rejected_field("(health: (injury_damage: -10))"),
            "health.injury_damage"
        );
    }

    #[test]
    fn test_empty_hurt_window_rejected() {
        assert_eq!(
            rejected_field("(health: (blink_steps: 0))"),
            "health.blink_steps"
        );
        assert_eq!(
            rejected_field("(health: (blink_interval_ms: 0))"),
            "health.blink_interval_ms"
        );
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        assert_eq!(
            rejected_field("(network: (net_tick_rate: 0))"),
            "network.net_tick_rate"
        );
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(reconcile: (blend_rate: -5.0))",
        )
        .unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::Invalid {
                field: "reconcile.blend_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_reload_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut broken = config.clone();
        broken.health.blink_steps = 0;
        broken.save(dir.path()).unwrap();

        assert!(matches!(
            config.reload(dir.path()),
            Err(ConfigError::Invalid {
                field: "health.blink_steps",
                ..
            })
        ));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
