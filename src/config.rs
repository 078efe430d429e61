use crate::agent::{
    AgentConfig, DEFAULT_ARENA_HEIGHT, DEFAULT_ARENA_WIDTH, DEFAULT_BULLET_SPEED,
    DEFAULT_HOSTILE_SPEED,
};
use crate::engagement::EngagementConfig;
use crate::registry::DEFAULT_ERROR_THRESHOLD;
use crate::scheduler::{DEFAULT_RETRAIN_INTERVAL_SECS, DEFAULT_STOP_JOIN_TIMEOUT_MS};
use crate::trainer::DEFAULT_SEED;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATA_PATH: &str = "data/gameplay_log.csv";
pub const DEFAULT_MODELS_DIR: &str = "models";

#[derive(Clone, Debug, PartialEq)]
pub struct AutopilotConfig {
    pub data_path: PathBuf,
    pub models_dir: PathBuf,
    pub retrain_interval_secs: u64,
    pub stop_join_timeout_ms: u64,
    pub error_threshold: u32,
    pub seed: u64,
    pub agent: AgentConfig,
    pub engagement: EngagementConfig,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            retrain_interval_secs: DEFAULT_RETRAIN_INTERVAL_SECS,
            stop_join_timeout_ms: DEFAULT_STOP_JOIN_TIMEOUT_MS,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            seed: DEFAULT_SEED,
            agent: AgentConfig::default(),
            engagement: EngagementConfig::default(),
        }
    }
}

impl AutopilotConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`AutopilotConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(vars: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut agent = defaults.agent.clone();

        agent.pickup_radius = read_env_f64(&vars, "AUTOPILOT_PICKUP_RADIUS", agent.pickup_radius);
        agent.dodge_band = read_env_f64(&vars, "AUTOPILOT_DODGE_BAND", agent.dodge_band);
        agent.standoff_distance =
            read_env_f64(&vars, "AUTOPILOT_STANDOFF_DISTANCE", agent.standoff_distance);
        agent.fire_alignment_rad =
            read_env_f64(&vars, "AUTOPILOT_FIRE_ALIGNMENT_RAD", agent.fire_alignment_rad);
        agent.edge_margin = read_env_f64(&vars, "AUTOPILOT_EDGE_MARGIN", agent.edge_margin);

        agent.bullet_speed = read_env_f64(&vars, "AUTOPILOT_BULLET_SPEED", agent.bullet_speed);
        agent.hostile_speed = read_env_f64(&vars, "AUTOPILOT_HOSTILE_SPEED", agent.hostile_speed);
        if agent.hostile_speed >= agent.bullet_speed {
            tracing::warn!(
                "AUTOPILOT_HOSTILE_SPEED ({}) >= AUTOPILOT_BULLET_SPEED ({}). Falling back to defaults.",
                agent.hostile_speed,
                agent.bullet_speed
            );
            agent.bullet_speed = DEFAULT_BULLET_SPEED;
            agent.hostile_speed = DEFAULT_HOSTILE_SPEED;
        }

        agent.arena_width = read_env_f64(&vars, "AUTOPILOT_ARENA_WIDTH", agent.arena_width);
        agent.arena_height = read_env_f64(&vars, "AUTOPILOT_ARENA_HEIGHT", agent.arena_height);
        if 2.0 * agent.edge_margin >= agent.arena_width.min(agent.arena_height) {
            tracing::warn!(
                "AUTOPILOT_EDGE_MARGIN ({}) leaves no room in a {}x{} arena. Falling back to defaults.",
                agent.edge_margin,
                agent.arena_width,
                agent.arena_height
            );
            agent.edge_margin = defaults.agent.edge_margin;
            agent.arena_width = DEFAULT_ARENA_WIDTH;
            agent.arena_height = DEFAULT_ARENA_HEIGHT;
        }

        let engagement = EngagementConfig {
            idle_threshold_s: read_env_f64(
                &vars,
                "AUTOPILOT_IDLE_THRESHOLD_S",
                defaults.engagement.idle_threshold_s,
            ),
            cursor_noise_px: read_env_f64(
                &vars,
                "AUTOPILOT_CURSOR_NOISE_PX",
                defaults.engagement.cursor_noise_px,
            ),
        };

        Self {
            data_path: vars("AUTOPILOT_DATA_PATH")
                .filter(|value| !value.trim().is_empty())
                .map_or(defaults.data_path, PathBuf::from),
            models_dir: vars("AUTOPILOT_MODELS_DIR")
                .filter(|value| !value.trim().is_empty())
                .map_or(defaults.models_dir, PathBuf::from),
            retrain_interval_secs: read_env_u64(
                &vars,
                "AUTOPILOT_RETRAIN_INTERVAL_SECS",
                defaults.retrain_interval_secs,
            ),
            stop_join_timeout_ms: read_env_u64(
                &vars,
                "AUTOPILOT_STOP_TIMEOUT_MS",
                defaults.stop_join_timeout_ms,
            ),
            error_threshold: read_env_u32(&vars, "AUTOPILOT_ERROR_THRESHOLD", defaults.error_threshold),
            seed: read_env_u64_allow_zero(&vars, "AUTOPILOT_SEED", defaults.seed),
            agent,
            engagement,
        }
    }
}

pub(crate) fn read_env_u64(vars: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    vars(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_env_u64_allow_zero(
    vars: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> u64 {
    vars(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_u32(vars: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> u32 {
    vars(name)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_env_f64(vars: &impl Fn(&str) -> Option<String>, name: &str, default: f64) -> f64 {
    vars(name)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_game_settings() {
        let config = AutopilotConfig::from_lookup(|_| None);
        assert_eq!(config, AutopilotConfig::default());
        assert_eq!(config.agent.bullet_speed, 10.0);
        assert_eq!(config.agent.hostile_speed, 2.0);
        assert_eq!(config.retrain_interval_secs, 120);
        assert_eq!(config.engagement.idle_threshold_s, 2.0);
    }

    #[test]
    fn valid_overrides_apply_and_bad_ones_are_ignored() {
        let config = AutopilotConfig::from_lookup(lookup(&[
            ("AUTOPILOT_MODELS_DIR", "/tmp/models"),
            ("AUTOPILOT_RETRAIN_INTERVAL_SECS", "30"),
            ("AUTOPILOT_ERROR_THRESHOLD", "0"),
            ("AUTOPILOT_IDLE_THRESHOLD_S", "not-a-number"),
            ("AUTOPILOT_PICKUP_RADIUS", " 120.5 "),
            ("AUTOPILOT_SEED", "0"),
        ]));
        assert_eq!(config.models_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.retrain_interval_secs, 30);
        assert_eq!(config.error_threshold, DEFAULT_ERROR_THRESHOLD);
        assert_eq!(config.engagement.idle_threshold_s, 2.0);
        assert_eq!(config.agent.pickup_radius, 120.5);
        assert_eq!(config.seed, 0);
    }

    #[test]
    fn inconsistent_speeds_fall_back_to_defaults() {
        let config = AutopilotConfig::from_lookup(lookup(&[
            ("AUTOPILOT_BULLET_SPEED", "3"),
            ("AUTOPILOT_HOSTILE_SPEED", "4"),
        ]));
        assert_eq!(config.agent.bullet_speed, DEFAULT_BULLET_SPEED);
        assert_eq!(config.agent.hostile_speed, DEFAULT_HOSTILE_SPEED);
    }
}
