use anyhow::{anyhow, Result};
use invasion_autopilot::classifier::{load_artifact, ModelName};
use invasion_autopilot::registry::ModelRegistry;
use invasion_autopilot::synth::{synthetic_label, synthetic_snapshot, write_synthetic_log};
use invasion_autopilot::trainer::{run_training, TrainerConfig, REPORT_FILE_NAME};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs;
use tempfile::TempDir;

fn quick_config(dir: &TempDir) -> TrainerConfig {
    let mut config = TrainerConfig::new(dir.path().join("log.csv"), dir.path().join("models"));
    config.forest.n_trees = 30;
    config
}

#[test]
fn separable_rule_is_learned_and_reloaded() -> Result<()> {
    let dir = TempDir::new()?;
    let config = quick_config(&dir);
    assert_eq!(write_synthetic_log(&config.data_path, 1_500, 7), 1_500);

    let report = run_training(&config)?;
    assert_eq!(report.rows_total, 1_500);
    assert_eq!(report.train_rows + report.test_rows, 1_500);
    assert_eq!(report.families.len(), 3);

    let best = report.best().ok_or_else(|| anyhow!("no families trained"))?;
    assert!(
        best.metrics.accuracy >= 0.9,
        "best family {} reached only {:.3}",
        best.name,
        best.metrics.accuracy
    );

    for name in ModelName::PRIORITY {
        load_artifact(&config.models_dir, name)?;
    }
    let summary: serde_json::Value =
        serde_json::from_slice(&fs::read(config.models_dir.join(REPORT_FILE_NAME))?)?;
    assert_eq!(summary["rows_total"], 1_500);

    // Fresh frames the trainer never saw.
    let registry = ModelRegistry::new(&config.models_dir);
    assert_eq!(registry.load_all(), 3);
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let trials = 300;
    let agree = (0..trials)
        .filter(|&i| {
            let snapshot = synthetic_snapshot(&mut rng, i);
            registry.predict(&snapshot) == synthetic_label(&snapshot)
        })
        .count();
    assert!(agree * 100 >= 75 * trials as usize, "registry agreed on {agree}/{trials}");
    Ok(())
}

#[test]
fn single_class_log_is_rejected_without_writing_artifacts() -> Result<()> {
    let dir = TempDir::new()?;
    let config = quick_config(&dir);
    let mut log = invasion_autopilot::telemetry::header_line();
    for ts in 0..20 {
        log.push_str(&format!("{ts},{}0\n", "1,".repeat(23)));
    }
    fs::write(&config.data_path, log)?;

    let err = run_training(&config).expect_err("one label only");
    assert!(err.to_string().contains("both labels"), "{err:#}");
    assert!(!config.models_dir.join("logreg.json").exists());
    Ok(())
}

#[test]
fn retraining_overwrites_and_registry_hot_swaps() -> Result<()> {
    let dir = TempDir::new()?;
    let config = quick_config(&dir);
    write_synthetic_log(&config.data_path, 600, 1);
    run_training(&config)?;

    let registry = ModelRegistry::new(&config.models_dir);
    registry.load_all();
    let first = registry.generation();
    let held = registry.snapshot();

    write_synthetic_log(&config.data_path, 600, 2);
    run_training(&config)?;
    registry.load_all();

    assert_eq!(registry.generation(), first + 1);
    assert_eq!(held.names().len(), 3);
    assert_eq!(registry.loaded_names().len(), 3);
    Ok(())
}
