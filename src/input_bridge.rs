use crate::agent::BehaviorIntent;
use crate::snapshot::{MoveFlags, Vec2};

/// The host's human-input frame: the autopilot produces exactly this shape so
/// the host's input path cannot tell the two apart.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VirtualInput {
    pub directional: MoveFlags,
    pub cursor: Vec2,
    pub primary_pressed: bool,
    pub primary_previous: bool,
}

impl VirtualInput {
    /// Press edge the host treats as a click.
    pub fn primary_just_pressed(&self) -> bool {
        self.primary_pressed && !self.primary_previous
    }
}

#[derive(Debug, Default)]
pub struct InputBridge {
    last_primary: bool,
}

impl InputBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, intent: &BehaviorIntent) -> VirtualInput {
        // A requested shot is always presented as a fresh press, even when
        // the previous frame also fired.
        let primary_previous = if intent.fire { false } else { self.last_primary };
        self.last_primary = intent.fire;
        VirtualInput {
            directional: intent.movement,
            cursor: intent.aim_point,
            primary_pressed: intent.fire,
            primary_previous,
        }
    }

    /// Forget button state, e.g. when control returns to the human.
    pub fn reset(&mut self) {
        self.last_primary = false;
    }
}
