use anyhow::Result;
use invasion_autopilot::agent::{AgentConfig, Rule};
use invasion_autopilot::engagement::{EngagementConfig, EngagementMode, HumanInput};
use invasion_autopilot::registry::ModelRegistry;
use invasion_autopilot::scheduler::{BackgroundTrainingScheduler, SchedulerConfig};
use invasion_autopilot::session::AutopilotSession;
use invasion_autopilot::snapshot::{GameStateSnapshot, Hostile, MoveFlags, Vec2};
use invasion_autopilot::synth::write_synthetic_log;
use invasion_autopilot::telemetry::TelemetryRecorder;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn frame(ts: u64, hostile_y: f64) -> GameStateSnapshot {
    GameStateSnapshot {
        timestamp_ms: ts,
        agent: Vec2::new(600.0, 700.0),
        hostiles: vec![Hostile::at(600.0, hostile_y)],
        bullet_limit: 5,
        ..Default::default()
    }
}

#[test]
fn idle_round_is_played_and_logged_then_handed_back() -> Result<()> {
    let dir = TempDir::new()?;
    let log_path = dir.path().join("gameplay_log.csv");
    let registry = Arc::new(ModelRegistry::new(dir.path().join("models")));
    registry.load_all();
    let mut session = AutopilotSession::new(
        AgentConfig::default(),
        EngagementConfig::default(),
        Arc::clone(&registry),
        Some(TelemetryRecorder::open(&log_path)),
        0.0,
    );

    let quiet = HumanInput::default();
    let mut auto_frames = 0;
    let mut live_frames = 0;
    for step in 0..300u64 {
        let now_s = step as f64 / 100.0;
        let outcome = session.frame(now_s, Some(&quiet), &frame(step * 10, 300.0), true);
        live_frames += 1;
        if let Some(intent) = outcome.intent {
            assert_eq!(outcome.engagement.mode(), EngagementMode::EngagedAuto);
            assert_eq!(intent.rule, Rule::Engage);
            auto_frames += 1;
        }
    }
    assert!(auto_frames >= 90, "autopilot acted on {auto_frames} frames");

    // Human grabs the stick: control returns within the same frame.
    let steer = HumanInput {
        directional: MoveFlags {
            right: true,
            ..MoveFlags::NONE
        },
        ..HumanInput::default()
    };
    let outcome = session.frame(3.0, Some(&steer), &frame(3_000, 300.0), true);
    live_frames += 1;
    assert_eq!(outcome.engagement.mode(), EngagementMode::Disengaged);
    assert!(outcome.intent.is_none());

    // Round over: nothing more is logged.
    session.frame(3.01, Some(&quiet), &frame(3_010, 300.0), false);
    drop(session);

    let log = fs::read_to_string(&log_path)?;
    assert_eq!(log.lines().count(), live_frames + 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn background_trainer_process_populates_the_registry() -> Result<()> {
    let dir = TempDir::new()?;
    let data = dir.path().join("gameplay_log.csv");
    let models = dir.path().join("models");
    write_synthetic_log(&data, 400, 3);

    let registry = Arc::new(ModelRegistry::new(&models));
    let config = SchedulerConfig::new(
        env!("CARGO_BIN_EXE_invasion-autopilot"),
        vec![
            "train".into(),
            "--data".into(),
            data.clone().into_os_string(),
            "--models-dir".into(),
            models.clone().into_os_string(),
        ],
    )
    .with_interval(Duration::from_secs(3600));
    let mut scheduler = BackgroundTrainingScheduler::start(config, Arc::clone(&registry))?;

    let deadline = Instant::now() + Duration::from_secs(120);
    while scheduler.cycles() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(scheduler.stop());
    assert_eq!(scheduler.cycles(), 1);
    assert_eq!(registry.loaded_names().len(), 3);
    assert!(registry.is_model_available());
    Ok(())
}
