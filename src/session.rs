//! One autopilot instance wired into a host frame loop.

use crate::agent::{AgentConfig, BehaviorIntent, DecisionAgent};
use crate::config::AutopilotConfig;
use crate::engagement::{EngagementConfig, EngagementScheduler, EngagementState, HumanInput};
use crate::input_bridge::{InputBridge, VirtualInput};
use crate::registry::ModelRegistry;
use crate::snapshot::GameStateSnapshot;
use crate::telemetry::{TelemetryRecord, TelemetryRecorder};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOutcome {
    pub engagement: EngagementState,
    /// Present only when the autopilot acted this frame.
    pub intent: Option<BehaviorIntent>,
    /// What the host should feed its input path instead of the human frame.
    pub input: Option<VirtualInput>,
    pub recorded: bool,
}

pub struct AutopilotSession {
    engagement: EngagementScheduler,
    agent: DecisionAgent,
    bridge: InputBridge,
    registry: Arc<ModelRegistry>,
    recorder: Option<TelemetryRecorder>,
    last_recorded_ts: Option<u64>,
    was_engaged: bool,
}

impl AutopilotSession {
    pub fn new(
        agent: AgentConfig,
        engagement: EngagementConfig,
        registry: Arc<ModelRegistry>,
        recorder: Option<TelemetryRecorder>,
        now_s: f64,
    ) -> Self {
        Self {
            engagement: EngagementScheduler::new(engagement, now_s),
            agent: DecisionAgent::new(agent),
            bridge: InputBridge::new(),
            registry,
            recorder,
            last_recorded_ts: None,
            was_engaged: false,
        }
    }

    /// Session with telemetry going to `config.data_path`.
    pub fn from_config(config: &AutopilotConfig, registry: Arc<ModelRegistry>, now_s: f64) -> Self {
        Self::new(
            config.agent.clone(),
            config.engagement,
            registry,
            Some(TelemetryRecorder::open(&config.data_path)),
            now_s,
        )
    }

    pub fn recorder(&self) -> Option<&TelemetryRecorder> {
        self.recorder.as_ref()
    }

    /// Run one host frame. The agent only acts while engaged and the round
    /// is live; telemetry is written once per live frame, labelled with the
    /// fire that was actually issued (autopilot or human).
    pub fn frame(
        &mut self,
        now_s: f64,
        human: Option<&HumanInput>,
        snapshot: &GameStateSnapshot,
        round_active: bool,
    ) -> FrameOutcome {
        let engagement = self.engagement.update(now_s, human);
        let engaged = engagement.mode().is_engaged();
        if self.was_engaged && !engaged {
            self.bridge.reset();
        }
        self.was_engaged = engaged;

        let (intent, input) = if engaged && round_active {
            let intent = self.agent.decide(snapshot, &self.registry);
            let input = self.bridge.apply(&intent);
            (Some(intent), Some(input))
        } else {
            (None, None)
        };

        let recorded = round_active && self.record(snapshot, intent, human);
        FrameOutcome {
            engagement,
            intent,
            input,
            recorded,
        }
    }

    fn record(
        &mut self,
        snapshot: &GameStateSnapshot,
        intent: Option<BehaviorIntent>,
        human: Option<&HumanInput>,
    ) -> bool {
        if self.last_recorded_ts == Some(snapshot.timestamp_ms) {
            return false;
        }
        let Some(recorder) = self.recorder.as_mut() else {
            return false;
        };
        let fired = match intent {
            Some(intent) => intent.fire,
            None => human.is_some_and(|h| h.primary),
        };
        let before = recorder.rows_written();
        recorder.record(&TelemetryRecord::from_snapshot(snapshot, fired));
        self.last_recorded_ts = Some(snapshot.timestamp_ms);
        recorder.rows_written() > before
    }
}
