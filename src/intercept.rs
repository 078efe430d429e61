//! Ballistic lead math: when must a projectile fired now meet a moving target.
//!
//! With `r` the shooter-to-target offset, `v` the target velocity and `b` the
//! projectile speed, an intercept at time `t` satisfies `|r + v t| = b t`,
//! i.e. `(v·v − b²) t² + 2 (r·v) t + r·r = 0`.

use crate::snapshot::Vec2;

const EPSILON: f64 = 1e-6;

/// Smallest positive intercept time, or `None` when the projectile can never
/// catch the target (or the inputs are degenerate).
pub fn solve(r: Vec2, v_target: Vec2, b_speed: f64) -> Option<f64> {
    if !r.is_finite() || !v_target.is_finite() || !b_speed.is_finite() {
        return None;
    }

    let a = v_target.dot(v_target) - b_speed * b_speed;
    let b = 2.0 * r.dot(v_target);
    let c = r.dot(r);

    if a.abs() < EPSILON {
        if b.abs() < EPSILON {
            return None;
        }
        let t = -c / b;
        return (t > 0.0 && t.is_finite()).then_some(t);
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let candidates = [(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)];

    let mut best: Option<f64> = None;
    for t in candidates {
        if !t.is_finite() || t <= 0.0 {
            continue;
        }
        match best {
            Some(existing) if existing <= t => {}
            _ => best = Some(t),
        }
    }
    best
}

/// Assumed velocity of a target closing on the shooter at `speed`.
pub fn closing_velocity(shooter: Vec2, target: Vec2, speed: f64) -> Vec2 {
    (shooter - target).normalized().scale(speed)
}

/// Where to aim so a projectile at `b_speed` meets the target. Falls back to
/// the target's current position (zero lead) when no intercept exists.
pub fn lead_point(shooter: Vec2, target: Vec2, v_target: Vec2, b_speed: f64) -> Vec2 {
    match solve(target - shooter, v_target, b_speed) {
        Some(t) => {
            let aim = target + v_target.scale(t);
            if aim.is_finite() {
                aim
            } else {
                target
            }
        }
        None => target,
    }
}
