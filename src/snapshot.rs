use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (other - self).length()
    }

    #[inline]
    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= 1e-9 || !len.is_finite() {
            Self::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Directional input flags, shared by the ship state, the agent intent and
/// the virtual input surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFlags {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MoveFlags {
    pub const NONE: Self = Self {
        left: false,
        right: false,
        up: false,
        down: false,
    };

    pub fn any(self) -> bool {
        self.left || self.right || self.up || self.down
    }

    /// Flags that steer from `from` toward `to`, ignoring offsets inside `dead_band`.
    pub fn toward(from: Vec2, to: Vec2, dead_band: f64) -> Self {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        Self {
            left: dx < -dead_band,
            right: dx > dead_band,
            up: dy < -dead_band,
            down: dy > dead_band,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hostile {
    pub position: Vec2,
    /// Observed velocity in units per frame, when the host tracks it.
    #[serde(default)]
    pub velocity: Option<Vec2>,
}

impl Hostile {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Vec2::new(x, y),
            velocity: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Read-only view of one frame of game state, produced by the host.
///
/// Coordinates are screen space (y grows downward). `facing` is in radians,
/// zero pointing up the screen and increasing counter-clockwise, so the
/// heading toward an offset `(dx, dy)` is `atan2(-dx, -dy)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub timestamp_ms: u64,
    pub agent: Vec2,
    pub facing: f64,
    pub health: f64,
    pub score: f64,
    pub lives: f64,
    pub movement: MoveFlags,
    pub cursor: Vec2,
    pub hostiles: Vec<Hostile>,
    pub projectiles: Vec<Projectile>,
    pub collectibles: Vec<Vec2>,
    pub bullets_in_flight: u32,
    pub bullet_limit: u32,
}

impl GameStateSnapshot {
    pub fn nearest_hostile(&self) -> Option<(&Hostile, f64)> {
        nearest_by(self.agent, self.hostiles.iter(), |h| h.position)
    }

    pub fn nearest_collectible(&self) -> Option<(Vec2, f64)> {
        nearest_by(self.agent, self.collectibles.iter(), |c| *c).map(|(c, d)| (*c, d))
    }

    pub fn nearest_projectile(&self) -> Option<(&Projectile, f64)> {
        nearest_by(self.agent, self.projectiles.iter(), |p| p.position)
    }
}

/// Heading of the offset `(dx, dy)` in the ship's angle convention.
#[inline]
pub fn heading_of(offset: Vec2) -> f64 {
    (-offset.x).atan2(-offset.y)
}

/// Absolute angular difference wrapped into `[0, PI]`.
#[inline]
pub fn angle_gap(a: f64, b: f64) -> f64 {
    let tau = std::f64::consts::TAU;
    let delta = (a - b + std::f64::consts::PI).rem_euclid(tau) - std::f64::consts::PI;
    delta.abs()
}

fn nearest_by<'a, T, I, F>(origin: Vec2, items: I, position: F) -> Option<(&'a T, f64)>
where
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> Vec2,
{
    let mut best: Option<(&'a T, f64)> = None;
    for item in items {
        let d = origin.distance(position(item));
        if !d.is_finite() {
            continue;
        }
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((item, d)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn heading_follows_ship_convention() {
        assert!((heading_of(Vec2::new(0.0, -10.0)) - 0.0).abs() < 1e-12);
        assert!((heading_of(Vec2::new(-10.0, 0.0)) - FRAC_PI_2).abs() < 1e-12);
        assert!((heading_of(Vec2::new(10.0, 0.0)) + FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn angle_gap_wraps_around() {
        assert!(angle_gap(PI - 0.1, -PI + 0.1) < 0.2 + 1e-9);
        assert!((angle_gap(0.0, PI) - PI).abs() < 1e-9);
    }

    #[test]
    fn nearest_hostile_picks_smallest_distance() {
        let snapshot = GameStateSnapshot {
            agent: Vec2::new(100.0, 100.0),
            hostiles: vec![Hostile::at(400.0, 100.0), Hostile::at(130.0, 140.0)],
            ..Default::default()
        };
        let (hostile, distance) = snapshot.nearest_hostile().unwrap();
        assert_eq!(hostile.position, Vec2::new(130.0, 140.0));
        assert!((distance - 50.0).abs() < 1e-9);
    }
}
