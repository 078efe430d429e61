//! Seeded synthetic gameplay for smoke tests and demos.
//!
//! Every frame has at least one hostile; the label is `fired` iff the nearest
//! hostile is closer than [`SYNTH_FIRE_DISTANCE`].

use crate::agent::{DEFAULT_ARENA_HEIGHT, DEFAULT_ARENA_WIDTH};
use crate::snapshot::{GameStateSnapshot, Hostile, MoveFlags, Projectile, Vec2};
use crate::telemetry::{TelemetryRecord, TelemetryRecorder};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;
use std::path::Path;

pub const SYNTH_FIRE_DISTANCE: f64 = 150.0;
const FRAME_MS: u64 = 8;

pub fn synthetic_snapshot(rng: &mut impl Rng, timestamp_ms: u64) -> GameStateSnapshot {
    let agent = Vec2::new(
        rng.gen_range(50.0..DEFAULT_ARENA_WIDTH - 50.0),
        rng.gen_range(DEFAULT_ARENA_HEIGHT * 0.5..DEFAULT_ARENA_HEIGHT - 30.0),
    );
    let nearest = rng.gen_range(20.0..400.0);
    let mut hostiles = vec![Hostile {
        position: around(rng, agent, nearest),
        velocity: rng.gen_bool(0.5).then(|| Vec2::new(0.0, 2.0)),
    }];
    for _ in 0..rng.gen_range(0..3) {
        let extra = nearest + rng.gen_range(50.0..500.0);
        hostiles.push(Hostile {
            position: around(rng, agent, extra),
            velocity: None,
        });
    }

    let projectiles = (0..rng.gen_range(0..3))
        .map(|_| Projectile {
            position: Vec2::new(
                rng.gen_range(0.0..DEFAULT_ARENA_WIDTH),
                rng.gen_range(0.0..DEFAULT_ARENA_HEIGHT),
            ),
            velocity: Vec2::new(0.0, rng.gen_range(2.0..6.0)),
        })
        .collect();
    let collectibles = if rng.gen_bool(0.2) {
        vec![Vec2::new(
            rng.gen_range(0.0..DEFAULT_ARENA_WIDTH),
            rng.gen_range(0.0..DEFAULT_ARENA_HEIGHT),
        )]
    } else {
        Vec::new()
    };

    GameStateSnapshot {
        timestamp_ms,
        agent,
        facing: rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
        health: rng.gen_range(1..=3) as f64,
        score: rng.gen_range(0..5_000) as f64,
        lives: rng.gen_range(1..=3) as f64,
        movement: MoveFlags {
            left: rng.gen_bool(0.2),
            right: rng.gen_bool(0.2),
            up: rng.gen_bool(0.2),
            down: rng.gen_bool(0.2),
        },
        cursor: hostiles[0].position,
        hostiles,
        projectiles,
        collectibles,
        bullets_in_flight: rng.gen_range(0..=5),
        bullet_limit: 5,
    }
}

fn around(rng: &mut impl Rng, center: Vec2, distance: f64) -> Vec2 {
    let angle = rng.gen_range(0.0..TAU);
    center + Vec2::new(angle.cos(), angle.sin()).scale(distance)
}

/// Label used for synthetic frames.
pub fn synthetic_label(snapshot: &GameStateSnapshot) -> bool {
    snapshot
        .nearest_hostile()
        .is_some_and(|(_, distance)| distance < SYNTH_FIRE_DISTANCE)
}

/// Appends `rows` synthetic frames through a [`TelemetryRecorder`] and
/// returns how many were written.
pub fn write_synthetic_log(path: &Path, rows: u64, seed: u64) -> u64 {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut recorder = TelemetryRecorder::open(path);
    for frame in 0..rows {
        let snapshot = synthetic_snapshot(&mut rng, frame * FRAME_MS);
        let fired = synthetic_label(&snapshot);
        recorder.record(&TelemetryRecord::from_snapshot(&snapshot, fired));
    }
    recorder.rows_written()
}
