//! Who is flying the ship: the human, the autopilot on request, or the
//! autopilot because the human went idle.

use crate::snapshot::{MoveFlags, Vec2};
use serde::Serialize;

pub const DEFAULT_IDLE_THRESHOLD_S: f64 = 2.0;
pub const DEFAULT_CURSOR_NOISE_PX: f64 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngagementConfig {
    pub idle_threshold_s: f64,
    /// Cursor movement at or below this many pixels is not human activity.
    pub cursor_noise_px: f64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            idle_threshold_s: DEFAULT_IDLE_THRESHOLD_S,
            cursor_noise_px: DEFAULT_CURSOR_NOISE_PX,
        }
    }
}

/// Human input for one frame as the host read it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HumanInput {
    pub toggle_pressed: bool,
    pub directional: MoveFlags,
    pub primary: bool,
    pub cursor_delta: Vec2,
}

impl HumanInput {
    pub fn is_active(&self, cursor_noise_px: f64) -> bool {
        self.directional.any() || self.primary || self.cursor_delta.length() > cursor_noise_px
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMode {
    Disengaged,
    EngagedManual,
    EngagedAuto,
}

impl EngagementMode {
    pub fn is_engaged(self) -> bool {
        !matches!(self, Self::Disengaged)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngagementState {
    pub enabled: bool,
    pub auto_enabled: bool,
    pub last_human_activity_s: f64,
}

impl EngagementState {
    pub fn mode(&self) -> EngagementMode {
        match (self.enabled, self.auto_enabled) {
            (false, _) => EngagementMode::Disengaged,
            (true, true) => EngagementMode::EngagedAuto,
            (true, false) => EngagementMode::EngagedManual,
        }
    }
}

pub struct EngagementScheduler {
    config: EngagementConfig,
    state: EngagementState,
}

impl EngagementScheduler {
    pub fn new(config: EngagementConfig, now_s: f64) -> Self {
        Self {
            config,
            state: EngagementState {
                enabled: false,
                auto_enabled: false,
                last_human_activity_s: now_s,
            },
        }
    }

    pub fn state(&self) -> EngagementState {
        self.state
    }

    pub fn mode(&self) -> EngagementMode {
        self.state.mode()
    }

    /// Host-driven override, bypassing the toggle.
    pub fn set_enabled(&mut self, enabled: bool, auto: bool) {
        self.state.enabled = enabled;
        self.state.auto_enabled = enabled && auto;
    }

    /// Advance one frame. `None` means the host could not read human input.
    pub fn update(&mut self, now_s: f64, input: Option<&HumanInput>) -> EngagementState {
        let Some(input) = input else {
            if self.state.enabled {
                tracing::warn!(
                    mode = ?self.state.mode(),
                    "human input unreadable, autopilot disengaged"
                );
                self.disengage();
            }
            self.state.last_human_activity_s = now_s;
            return self.state;
        };

        // Manual toggle wins over everything else this frame.
        if input.toggle_pressed {
            let engage = !self.state.enabled;
            self.state.enabled = engage;
            self.state.auto_enabled = false;
            self.state.last_human_activity_s = now_s;
            tracing::info!(engaged = engage, "autopilot toggled");
            return self.state;
        }

        if input.is_active(self.config.cursor_noise_px) {
            self.state.last_human_activity_s = now_s;
            if self.state.mode() == EngagementMode::EngagedAuto {
                tracing::info!("human input detected, auto engagement released");
                self.disengage();
            }
            return self.state;
        }

        if !self.state.enabled
            && now_s - self.state.last_human_activity_s >= self.config.idle_threshold_s
        {
            self.state.enabled = true;
            self.state.auto_enabled = true;
            tracing::info!(
                idle_s = now_s - self.state.last_human_activity_s,
                "player idle, autopilot engaged"
            );
        }
        self.state
    }

    fn disengage(&mut self) {
        self.state.enabled = false;
        self.state.auto_enabled = false;
    }
}
