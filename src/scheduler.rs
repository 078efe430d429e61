use crate::registry::ModelRegistry;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_RETRAIN_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_STOP_JOIN_TIMEOUT_MS: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub interval: Duration,
    pub join_timeout: Duration,
}

impl SchedulerConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            interval: Duration::from_secs(DEFAULT_RETRAIN_INTERVAL_SECS),
            join_timeout: Duration::from_millis(DEFAULT_STOP_JOIN_TIMEOUT_MS),
        }
    }

    /// Re-invokes this binary as `train --data <log> --models-dir <dir>`.
    pub fn for_current_exe(data_path: &Path, models_dir: &Path) -> Result<Self> {
        let program = std::env::current_exe().context("failed resolving current executable")?;
        Ok(Self::new(
            program,
            vec![
                "train".into(),
                "--data".into(),
                data_path.as_os_str().to_owned(),
                "--models-dir".into(),
                models_dir.as_os_str().to_owned(),
            ],
        ))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }
}

/// Periodically retrains in a child process and reloads the registry.
///
/// Cancellation is best-effort: `stop` interrupts the wait between runs, but a
/// training run already in progress is left to finish on a detached thread.
pub struct BackgroundTrainingScheduler {
    stopping: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    wake_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl BackgroundTrainingScheduler {
    pub fn start(config: SchedulerConfig, registry: Arc<ModelRegistry>) -> Result<Self> {
        let stopping = Arc::new(AtomicBool::new(false));
        let cycles = Arc::new(AtomicU64::new(0));
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let join_timeout = config.join_timeout;
        let interval_secs = config.interval.as_secs_f64();
        let program = config.program.display().to_string();

        let handle = {
            let stopping = Arc::clone(&stopping);
            let cycles = Arc::clone(&cycles);
            thread::Builder::new()
                .name("autopilot-trainer".to_string())
                .spawn(move || {
                    run_loop(&config, &registry, &stopping, &cycles, &wake_rx);
                    let _ = done_tx.send(());
                })
                .context("failed spawning trainer thread")?
        };

        tracing::info!(%program, interval_secs, "background training started");
        Ok(Self {
            stopping,
            cycles,
            wake_tx: Some(wake_tx),
            done_rx,
            handle: Some(handle),
            join_timeout,
        })
    }

    /// Completed train-and-reload cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns `true` if the worker exited within the join timeout. Idempotent.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        self.stopping.store(true, Ordering::Release);
        // Dropping the sender disconnects the channel and ends the wait early.
        self.wake_tx.take();

        match self.done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("trainer thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "trainer still running at shutdown, detaching"
                );
                false
            }
        }
    }
}

impl Drop for BackgroundTrainingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    config: &SchedulerConfig,
    registry: &ModelRegistry,
    stopping: &AtomicBool,
    cycles: &AtomicU64,
    wake_rx: &Receiver<()>,
) {
    while !stopping.load(Ordering::Acquire) {
        run_trainer(config);
        if stopping.load(Ordering::Acquire) {
            break;
        }
        registry.load_all();
        cycles.fetch_add(1, Ordering::AcqRel);

        match wake_rx.recv_timeout(config.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Failures are logged and retried on the next interval.
fn run_trainer(config: &SchedulerConfig) {
    let status = Command::new(&config.program)
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => {
            tracing::debug!(program = %config.program.display(), "trainer run finished");
        }
        Ok(status) => {
            tracing::warn!(
                program = %config.program.display(),
                code = ?status.code(),
                "trainer exited unsuccessfully"
            );
        }
        Err(err) => {
            tracing::warn!(program = %config.program.display(), "failed to launch trainer: {err}");
        }
    }
}
