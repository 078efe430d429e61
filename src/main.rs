use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use invasion_autopilot::classifier::ModelName;
use invasion_autopilot::config::AutopilotConfig;
use invasion_autopilot::registry::ModelRegistry;
use invasion_autopilot::scheduler::{BackgroundTrainingScheduler, SchedulerConfig};
use invasion_autopilot::synth::write_synthetic_log;
use invasion_autopilot::trainer::{run_training, TrainerConfig, REPORT_FILE_NAME};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "invasion-autopilot")]
#[command(about = "Self-play autopilot: telemetry, fire-classifier training and model store tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train every classifier family from a telemetry log
    Train {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        models_dir: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Load the model store and report which artifacts are usable
    ModelStatus {
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
    /// Write a seeded synthetic telemetry log (fire iff nearest hostile < 150 px)
    SynthTelemetry {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 2_000)]
        rows: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Run the background retrain loop in the foreground for a bounded time
    RetrainLoop {
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        models_dir: Option<PathBuf>,
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long, default_value_t = 300)]
        duration_secs: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let Cli { command } = Cli::parse();
    let config = AutopilotConfig::from_env();

    match command {
        Commands::Train {
            data,
            models_dir,
            seed,
        } => {
            let models_dir = models_dir.unwrap_or(config.models_dir);
            let trainer = TrainerConfig::new(data, models_dir.clone())
                .with_seed(seed.unwrap_or(config.seed));
            let report = run_training(&trainer)
                .with_context(|| format!("training from {} failed", trainer.data_path.display()))?;

            println!("rows={}", report.rows_total);
            println!("dropped={}", report.rows_dropped);
            println!("positives={}", report.positives);
            println!("train_rows={}", report.train_rows);
            println!("test_rows={}", report.test_rows);
            for family in &report.families {
                println!("{}_accuracy={:.4}", family.name, family.metrics.accuracy);
                match family.metrics.roc_auc {
                    Some(auc) => println!("{}_auc={auc:.4}", family.name),
                    None => println!("{}_auc=n/a", family.name),
                }
            }
            if let Some(best) = report.best() {
                println!("best={}", best.name);
            }
            println!("report={}", models_dir.join(REPORT_FILE_NAME).display());
        }
        Commands::ModelStatus { models_dir } => {
            let models_dir = models_dir.unwrap_or(config.models_dir);
            let registry =
                ModelRegistry::new(&models_dir).with_error_threshold(config.error_threshold);
            registry.load_all();
            let loaded = registry.loaded_names();
            for name in ModelName::PRIORITY {
                let state = if loaded.contains(&name) { "loaded" } else { "unavailable" };
                println!("{name}={state}");
            }
            println!("models_dir={}", registry.models_dir().display());
            println!("available={}", registry.is_model_available());
        }
        Commands::SynthTelemetry { output, rows, seed } => {
            let written = write_synthetic_log(&output, rows, seed);
            println!("rows={written}");
            println!("output={}", output.display());
        }
        Commands::RetrainLoop {
            data,
            models_dir,
            interval_secs,
            duration_secs,
        } => {
            let data = data.unwrap_or(config.data_path);
            let models_dir = models_dir.unwrap_or(config.models_dir);
            let registry = Arc::new(
                ModelRegistry::new(&models_dir).with_error_threshold(config.error_threshold),
            );
            registry.load_all();

            let scheduler_config = SchedulerConfig::for_current_exe(&data, &models_dir)?
                .with_interval(Duration::from_secs(
                    interval_secs.unwrap_or(config.retrain_interval_secs).max(1),
                ))
                .with_join_timeout(Duration::from_millis(config.stop_join_timeout_ms));
            let mut scheduler =
                BackgroundTrainingScheduler::start(scheduler_config, Arc::clone(&registry))?;
            thread::sleep(Duration::from_secs(duration_secs));
            let clean = scheduler.stop();

            println!("cycles={}", scheduler.cycles());
            println!("generation={}", registry.generation());
            let loaded: Vec<&str> = registry
                .loaded_names()
                .into_iter()
                .map(ModelName::as_str)
                .collect();
            println!("loaded={}", loaded.join(","));
            println!("clean_stop={clean}");
        }
    }

    Ok(())
}
