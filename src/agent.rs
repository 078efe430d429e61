//! Per-frame behavior arbitration.
//!
//! Rules are tried in a fixed order and the first that applies produces the
//! frame's [`BehaviorIntent`]:
//!
//! 1. collect a nearby pickup
//! 2. dodge an incoming projectile
//! 3. engage the nearest hostile (aim with lead, maybe fire)
//! 4. idle
//!
//! Whether to fire while engaging is delegated to a [`FireDecisionStrategy`],
//! picked each frame from registry availability.

use crate::intercept::{closing_velocity, lead_point};
use crate::registry::ModelRegistry;
use crate::snapshot::{angle_gap, heading_of, GameStateSnapshot, MoveFlags, Projectile, Vec2};
use serde::Serialize;

pub const DEFAULT_PICKUP_RADIUS: f64 = 240.0;
pub const DEFAULT_MOVE_DEAD_BAND: f64 = 6.0;
pub const DEFAULT_DODGE_BAND: f64 = 80.0;
pub const DEFAULT_DODGE_WINDOW_AHEAD: f64 = 200.0;
pub const DEFAULT_DODGE_WINDOW_BEHIND: f64 = 50.0;
pub const DEFAULT_EDGE_MARGIN: f64 = 40.0;
pub const DEFAULT_STANDOFF_DISTANCE: f64 = 200.0;
pub const DEFAULT_VERTICAL_ADJUST: f64 = 20.0;
pub const DEFAULT_HOSTILE_SPEED: f64 = 2.0;
pub const DEFAULT_BULLET_SPEED: f64 = 10.0;
pub const DEFAULT_FIRE_ALIGNMENT_RAD: f64 = 0.35;
pub const DEFAULT_ARENA_WIDTH: f64 = 1200.0;
pub const DEFAULT_ARENA_HEIGHT: f64 = 800.0;

#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub pickup_radius: f64,
    pub move_dead_band: f64,
    pub dodge_band: f64,
    /// How far above the agent (toward -y) a projectile counts as a threat.
    pub dodge_window_ahead: f64,
    /// How far below the agent a projectile still counts as a threat.
    pub dodge_window_behind: f64,
    pub edge_margin: f64,
    pub standoff_distance: f64,
    pub vertical_adjust: f64,
    pub hostile_speed: f64,
    pub bullet_speed: f64,
    pub fire_alignment_rad: f64,
    pub arena_width: f64,
    pub arena_height: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            pickup_radius: DEFAULT_PICKUP_RADIUS,
            move_dead_band: DEFAULT_MOVE_DEAD_BAND,
            dodge_band: DEFAULT_DODGE_BAND,
            dodge_window_ahead: DEFAULT_DODGE_WINDOW_AHEAD,
            dodge_window_behind: DEFAULT_DODGE_WINDOW_BEHIND,
            edge_margin: DEFAULT_EDGE_MARGIN,
            standoff_distance: DEFAULT_STANDOFF_DISTANCE,
            vertical_adjust: DEFAULT_VERTICAL_ADJUST,
            hostile_speed: DEFAULT_HOSTILE_SPEED,
            bullet_speed: DEFAULT_BULLET_SPEED,
            fire_alignment_rad: DEFAULT_FIRE_ALIGNMENT_RAD,
            arena_width: DEFAULT_ARENA_WIDTH,
            arena_height: DEFAULT_ARENA_HEIGHT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Collect,
    Dodge,
    Engage,
    Idle,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Dodge => "dodge",
            Self::Engage => "engage",
            Self::Idle => "idle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BehaviorIntent {
    pub movement: MoveFlags,
    pub aim_point: Vec2,
    pub fire: bool,
    pub rule: Rule,
}

impl BehaviorIntent {
    pub fn idle(agent: Vec2) -> Self {
        Self {
            movement: MoveFlags::NONE,
            aim_point: agent,
            fire: false,
            rule: Rule::Idle,
        }
    }
}

pub struct FireContext<'a> {
    pub snapshot: &'a GameStateSnapshot,
    pub registry: &'a ModelRegistry,
    pub aim_point: Vec2,
}

pub trait FireDecisionStrategy {
    fn name(&self) -> &'static str;

    fn should_fire(&self, ctx: &FireContext<'_>) -> bool;
}

/// Defers to the loaded classifiers.
pub struct ModelBacked;

impl FireDecisionStrategy for ModelBacked {
    fn name(&self) -> &'static str {
        "model"
    }

    fn should_fire(&self, ctx: &FireContext<'_>) -> bool {
        ctx.registry.predict(ctx.snapshot)
    }
}

/// Fires when the ship already faces the aim point and a bullet slot is free.
pub struct Heuristic {
    pub alignment_rad: f64,
}

impl FireDecisionStrategy for Heuristic {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn should_fire(&self, ctx: &FireContext<'_>) -> bool {
        let snapshot = ctx.snapshot;
        if snapshot.bullets_in_flight >= snapshot.bullet_limit {
            return false;
        }
        let aim_heading = heading_of(ctx.aim_point - snapshot.agent);
        angle_gap(aim_heading, snapshot.facing) < self.alignment_rad
    }
}

pub struct DecisionAgent {
    config: AgentConfig,
    heuristic: Heuristic,
    last_fire_ts: Option<u64>,
}

impl DecisionAgent {
    pub fn new(config: AgentConfig) -> Self {
        let heuristic = Heuristic {
            alignment_rad: config.fire_alignment_rad,
        };
        Self {
            config,
            heuristic,
            last_fire_ts: None,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn decide(&mut self, snapshot: &GameStateSnapshot, registry: &ModelRegistry) -> BehaviorIntent {
        if let Some(intent) = self.collect(snapshot) {
            return intent;
        }
        if let Some(intent) = self.dodge(snapshot) {
            return intent;
        }
        if let Some(intent) = self.engage(snapshot, registry) {
            return intent;
        }
        BehaviorIntent::idle(snapshot.agent)
    }

    fn collect(&self, snapshot: &GameStateSnapshot) -> Option<BehaviorIntent> {
        let (target, distance) = snapshot.nearest_collectible()?;
        if distance >= self.config.pickup_radius {
            return None;
        }
        Some(BehaviorIntent {
            movement: MoveFlags::toward(snapshot.agent, target, self.config.move_dead_band),
            aim_point: target,
            fire: false,
            rule: Rule::Collect,
        })
    }

    fn is_threat(&self, agent: Vec2, projectile: &Projectile) -> bool {
        let rel = projectile.position - agent;
        let closing = projectile.velocity.dot(agent - projectile.position) > 0.0;
        rel.x.abs() < self.config.dodge_band
            && rel.y > -self.config.dodge_window_ahead
            && rel.y < self.config.dodge_window_behind
            && closing
    }

    fn dodge(&self, snapshot: &GameStateSnapshot) -> Option<BehaviorIntent> {
        let agent = snapshot.agent;
        let threat = snapshot
            .projectiles
            .iter()
            .filter(|p| self.is_threat(agent, p))
            .min_by(|a, b| {
                agent
                    .distance(a.position)
                    .total_cmp(&agent.distance(b.position))
            })?;

        let cfg = &self.config;
        let mut go_left = threat.position.x > agent.x;
        if agent.x < cfg.edge_margin {
            go_left = false;
        } else if agent.x > cfg.arena_width - cfg.edge_margin {
            go_left = true;
        }

        let mut go_up = threat.position.y > agent.y;
        if go_up && agent.y < cfg.edge_margin {
            go_up = false;
        } else if !go_up && agent.y > cfg.arena_height - cfg.edge_margin {
            go_up = true;
        }

        let aim_point = snapshot
            .nearest_hostile()
            .map_or(agent, |(hostile, _)| hostile.position);
        Some(BehaviorIntent {
            movement: MoveFlags {
                left: go_left,
                right: !go_left,
                up: go_up,
                down: !go_up,
            },
            aim_point,
            fire: false,
            rule: Rule::Dodge,
        })
    }

    fn engage(&mut self, snapshot: &GameStateSnapshot, registry: &ModelRegistry) -> Option<BehaviorIntent> {
        let (hostile, distance) = snapshot.nearest_hostile()?;
        let agent = snapshot.agent;
        let cfg = &self.config;

        let movement = if distance > cfg.standoff_distance {
            MoveFlags::toward(agent, hostile.position, cfg.move_dead_band)
        } else {
            let dy = hostile.position.y - agent.y;
            MoveFlags {
                up: dy < -cfg.vertical_adjust,
                down: dy > cfg.vertical_adjust,
                ..MoveFlags::NONE
            }
        };

        let velocity = closing_velocity(agent, hostile.position, cfg.hostile_speed);
        let aim_point = lead_point(agent, hostile.position, velocity, cfg.bullet_speed);

        let ctx = FireContext {
            snapshot,
            registry,
            aim_point,
        };
        let strategy: &dyn FireDecisionStrategy = if registry.is_model_available() {
            &ModelBacked
        } else {
            &self.heuristic
        };
        let wants_fire = strategy.should_fire(&ctx);
        let strategy_name = strategy.name();
        let fire = wants_fire && self.accept_fire(snapshot.timestamp_ms);
        if fire {
            tracing::trace!(strategy = strategy_name, ts = snapshot.timestamp_ms, "fire");
        }

        Some(BehaviorIntent {
            movement,
            aim_point,
            fire,
            rule: Rule::Engage,
        })
    }

    /// At most one accepted fire request per frame timestamp.
    fn accept_fire(&mut self, timestamp_ms: u64) -> bool {
        if self.last_fire_ts == Some(timestamp_ms) {
            return false;
        }
        self.last_fire_ts = Some(timestamp_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FireClassifier, ModelName};
    use crate::error::ArtifactError;
    use crate::snapshot::Hostile;
    use std::sync::Arc;

    struct Always(bool);

    impl FireClassifier for Always {
        fn family(&self) -> &'static str {
            "always"
        }

        fn predict_probability(&self, _features: &[f64]) -> Result<f64, ArtifactError> {
            Ok(if self.0 { 1.0 } else { 0.0 })
        }
    }

    fn base() -> GameStateSnapshot {
        GameStateSnapshot {
            timestamp_ms: 1_000,
            agent: Vec2::new(600.0, 700.0),
            bullet_limit: 5,
            ..Default::default()
        }
    }

    fn empty_registry() -> ModelRegistry {
        ModelRegistry::new("unused")
    }

    #[test]
    fn collectible_in_radius_beats_hostile_in_range() {
        let snapshot = GameStateSnapshot {
            hostiles: vec![Hostile::at(600.0, 550.0)],
            collectibles: vec![Vec2::new(450.0, 700.0)],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert_eq!(intent.rule, Rule::Collect);
        assert!(intent.movement.left && !intent.movement.right);
        assert_eq!(intent.aim_point, Vec2::new(450.0, 700.0));
        assert!(!intent.fire);
    }

    #[test]
    fn far_collectible_is_ignored() {
        let snapshot = GameStateSnapshot {
            collectibles: vec![Vec2::new(100.0, 100.0)],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert_eq!(intent, BehaviorIntent::idle(snapshot.agent));
    }

    #[test]
    fn dodges_a_falling_projectile() {
        let snapshot = GameStateSnapshot {
            projectiles: vec![Projectile {
                position: Vec2::new(620.0, 600.0),
                velocity: Vec2::new(0.0, 4.0),
            }],
            hostiles: vec![Hostile::at(600.0, 300.0)],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert_eq!(intent.rule, Rule::Dodge);
        assert!(intent.movement.left, "strafe away from a projectile on the right");
        assert!(intent.movement.down, "back away from a projectile above");
        assert!(!intent.fire);
    }

    #[test]
    fn receding_or_wide_projectiles_are_not_threats() {
        let snapshot = GameStateSnapshot {
            projectiles: vec![
                Projectile {
                    position: Vec2::new(600.0, 600.0),
                    velocity: Vec2::new(0.0, -4.0),
                },
                Projectile {
                    position: Vec2::new(750.0, 650.0),
                    velocity: Vec2::new(0.0, 4.0),
                },
            ],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert_eq!(intent.rule, Rule::Idle);
    }

    #[test]
    fn dodge_is_pinned_inside_the_arena() {
        let snapshot = GameStateSnapshot {
            agent: Vec2::new(1190.0, 790.0),
            projectiles: vec![Projectile {
                position: Vec2::new(1150.0, 700.0),
                velocity: Vec2::new(0.0, 5.0),
            }],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert!(intent.movement.left);
        assert!(intent.movement.up, "cannot retreat further down");
    }

    #[test]
    fn distant_hostile_is_approached_and_led() {
        let snapshot = GameStateSnapshot {
            hostiles: vec![Hostile::at(300.0, 300.0)],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert_eq!(intent.rule, Rule::Engage);
        assert!(intent.movement.left && intent.movement.up);
        // Closing target: the lead point sits between hostile and agent.
        let hostile = Vec2::new(300.0, 300.0);
        assert!(intent.aim_point.distance(snapshot.agent) < hostile.distance(snapshot.agent));
    }

    #[test]
    fn hostile_inside_standoff_holds_lateral_position() {
        let snapshot = GameStateSnapshot {
            hostiles: vec![Hostile::at(500.0, 600.0)],
            ..base()
        };
        let intent = DecisionAgent::new(AgentConfig::default()).decide(&snapshot, &empty_registry());
        assert!(!intent.movement.left && !intent.movement.right);
        assert!(intent.movement.up);
    }

    #[test]
    fn heuristic_fires_when_aligned_with_free_slot() {
        let aligned = GameStateSnapshot {
            hostiles: vec![Hostile::at(600.0, 400.0)],
            facing: 0.0,
            ..base()
        };
        let mut agent = DecisionAgent::new(AgentConfig::default());
        assert!(agent.decide(&aligned, &empty_registry()).fire);

        let saturated = GameStateSnapshot {
            timestamp_ms: 2_000,
            bullets_in_flight: 5,
            ..aligned.clone()
        };
        assert!(!agent.decide(&saturated, &empty_registry()).fire);

        let turned_away = GameStateSnapshot {
            timestamp_ms: 3_000,
            facing: std::f64::consts::FRAC_PI_2,
            ..aligned
        };
        assert!(!agent.decide(&turned_away, &empty_registry()).fire);
    }

    #[test]
    fn loaded_model_overrides_heuristic() {
        let registry = empty_registry();
        registry.install(ModelName::Logreg, Arc::new(Always(true)));
        let misaligned = GameStateSnapshot {
            hostiles: vec![Hostile::at(600.0, 400.0)],
            facing: std::f64::consts::PI,
            ..base()
        };
        let mut agent = DecisionAgent::new(AgentConfig::default());
        assert!(agent.decide(&misaligned, &registry).fire);

        registry.install(ModelName::Logreg, Arc::new(Always(false)));
        let aligned = GameStateSnapshot {
            timestamp_ms: 2_000,
            facing: 0.0,
            ..misaligned
        };
        assert!(!agent.decide(&aligned, &registry).fire);
    }

    #[test]
    fn fire_is_debounced_per_timestamp() {
        let snapshot = GameStateSnapshot {
            hostiles: vec![Hostile::at(600.0, 400.0)],
            ..base()
        };
        let mut agent = DecisionAgent::new(AgentConfig::default());
        let registry = empty_registry();
        assert!(agent.decide(&snapshot, &registry).fire);
        assert!(!agent.decide(&snapshot, &registry).fire);

        let next = GameStateSnapshot {
            timestamp_ms: snapshot.timestamp_ms + 8,
            ..snapshot
        };
        assert!(agent.decide(&next, &registry).fire);
    }
}
