//! Feature schema shared by the telemetry log, the trainer and the registry.
//!
//! Column order is part of the artifact format: artifacts persist the list
//! they were trained with and the registry refuses any mismatch.

use crate::snapshot::GameStateSnapshot;

pub const FEATURE_COLUMNS: [&str; 23] = [
    "score",
    "lives",
    "health",
    "agent_x",
    "agent_y",
    "facing",
    "moving_left",
    "moving_right",
    "moving_up",
    "moving_down",
    "cursor_x",
    "cursor_y",
    "bullets_in_flight",
    "bullet_limit",
    "hostile_count",
    "nearest_hostile_dx",
    "nearest_hostile_dy",
    "nearest_hostile_distance",
    "nearest_hostile_vx",
    "nearest_hostile_vy",
    "projectile_count",
    "nearest_projectile_distance",
    "collectible_count",
];

pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

pub const LABEL_COLUMN: &str = "fired";
pub const TIMESTAMP_COLUMN: &str = "timestamp_ms";

pub fn column_index(name: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|column| *column == name)
}

/// Position of `nearest_hostile_distance` in [`FEATURE_COLUMNS`].
pub const NEAREST_HOSTILE_DISTANCE: usize = 17;

/// One frame of features; `None` marks a value that does not exist this frame.
pub type FeatureRow = [Option<f64>; FEATURE_COUNT];

/// Extract the raw feature row from a snapshot, keeping missing values explicit.
pub fn feature_row(snapshot: &GameStateSnapshot) -> FeatureRow {
    let flag = |value: bool| Some(if value { 1.0 } else { 0.0 });
    let nearest = snapshot.nearest_hostile();
    let nearest_offset = nearest.map(|(hostile, _)| hostile.position - snapshot.agent);
    let nearest_velocity = nearest.and_then(|(hostile, _)| hostile.velocity);

    [
        Some(snapshot.score),
        Some(snapshot.lives),
        Some(snapshot.health),
        Some(snapshot.agent.x),
        Some(snapshot.agent.y),
        Some(snapshot.facing),
        flag(snapshot.movement.left),
        flag(snapshot.movement.right),
        flag(snapshot.movement.up),
        flag(snapshot.movement.down),
        Some(snapshot.cursor.x),
        Some(snapshot.cursor.y),
        Some(f64::from(snapshot.bullets_in_flight)),
        Some(f64::from(snapshot.bullet_limit)),
        Some(snapshot.hostiles.len() as f64),
        nearest_offset.map(|offset| offset.x),
        nearest_offset.map(|offset| offset.y),
        nearest.map(|(_, distance)| distance),
        nearest_velocity.map(|velocity| velocity.x),
        nearest_velocity.map(|velocity| velocity.y),
        Some(snapshot.projectiles.len() as f64),
        snapshot.nearest_projectile().map(|(_, distance)| distance),
        Some(snapshot.collectibles.len() as f64),
    ]
}

/// Dense vector with missing and non-finite values filled with zero, the same
/// fill the trainer applies to the log.
pub fn densify(row: &FeatureRow) -> [f64; FEATURE_COUNT] {
    let mut out = [0.0; FEATURE_COUNT];
    for (slot, value) in out.iter_mut().zip(row.iter()) {
        *slot = value.filter(|v| v.is_finite()).unwrap_or(0.0);
    }
    out
}

pub fn feature_vector(snapshot: &GameStateSnapshot) -> [f64; FEATURE_COUNT] {
    densify(&feature_row(snapshot))
}

pub fn columns_match(columns: &[String]) -> bool {
    columns.len() == FEATURE_COUNT
        && columns
            .iter()
            .zip(FEATURE_COLUMNS.iter())
            .all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Hostile, Vec2};

    #[test]
    fn distance_index_matches_schema() {
        assert_eq!(
            column_index("nearest_hostile_distance"),
            Some(NEAREST_HOSTILE_DISTANCE)
        );
    }

    #[test]
    fn missing_hostile_leaves_gaps_that_densify_to_zero() {
        let snapshot = GameStateSnapshot {
            agent: Vec2::new(10.0, 20.0),
            bullet_limit: 5,
            ..Default::default()
        };
        let row = feature_row(&snapshot);
        assert_eq!(row[NEAREST_HOSTILE_DISTANCE], None);
        let dense = densify(&row);
        assert_eq!(dense[NEAREST_HOSTILE_DISTANCE], 0.0);
        assert_eq!(dense[column_index("bullet_limit").unwrap()], 5.0);
    }

    #[test]
    fn nearest_hostile_offsets_are_relative_to_agent() {
        let snapshot = GameStateSnapshot {
            agent: Vec2::new(100.0, 500.0),
            hostiles: vec![Hostile {
                position: Vec2::new(130.0, 460.0),
                velocity: Some(Vec2::new(1.0, 2.0)),
            }],
            ..Default::default()
        };
        let dense = feature_vector(&snapshot);
        assert_eq!(dense[column_index("nearest_hostile_dx").unwrap()], 30.0);
        assert_eq!(dense[column_index("nearest_hostile_dy").unwrap()], -40.0);
        assert_eq!(dense[NEAREST_HOSTILE_DISTANCE], 50.0);
        assert_eq!(dense[column_index("nearest_hostile_vy").unwrap()], 2.0);
    }
}
