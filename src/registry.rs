//! Live set of fire classifiers, hot-swapped by the background trainer.

use crate::classifier::{load_artifact, FireClassifier, ModelName};
use crate::error::ArtifactError;
use crate::features::feature_vector;
use crate::snapshot::GameStateSnapshot;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub const DEFAULT_ERROR_THRESHOLD: u32 = 8;

/// One immutable generation of loaded artifacts, in priority order.
#[derive(Clone, Default)]
pub struct ModelSet {
    entries: Vec<(ModelName, Arc<dyn FireClassifier>)>,
}

impl ModelSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<ModelName> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn get(&self, name: ModelName) -> Option<&Arc<dyn FireClassifier>> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, model)| model)
    }

    fn with(mut self, name: ModelName, model: Arc<dyn FireClassifier>) -> Self {
        self.entries.retain(|(entry, _)| *entry != name);
        self.entries.push((name, model));
        self.entries.sort_by_key(|(entry, _)| priority(*entry));
        self
    }
}

fn priority(name: ModelName) -> usize {
    ModelName::PRIORITY
        .iter()
        .position(|candidate| *candidate == name)
        .unwrap_or(usize::MAX)
}

pub struct ModelRegistry {
    models_dir: PathBuf,
    current: RwLock<Arc<ModelSet>>,
    generation: AtomicU64,
    consecutive_failures: AtomicU32,
    error_threshold: u32,
}

impl ModelRegistry {
    /// Starts empty; call [`ModelRegistry::load_all`] to read the store.
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            current: RwLock::new(Arc::new(ModelSet::default())),
            generation: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold.max(1);
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Rebuilds the whole set from disk and publishes it with one swap. Each
    /// name loads or fails on its own; returns how many loaded.
    pub fn load_all(&self) -> usize {
        let mut set = ModelSet::default();
        for name in ModelName::PRIORITY {
            match load_artifact(&self.models_dir, name) {
                Ok(model) => {
                    let model: Arc<dyn FireClassifier> = Arc::new(model);
                    set.entries.push((name, model));
                }
                Err(ArtifactError::Missing { path }) => {
                    tracing::debug!(model = %name, path = %path.display(), "no artifact");
                }
                Err(err) => {
                    tracing::warn!(model = %name, "artifact rejected: {err}");
                }
            }
        }
        let loaded = set.entries.len();
        self.publish(set);
        tracing::info!(
            dir = %self.models_dir.display(),
            loaded,
            generation = self.generation(),
            "model registry reloaded"
        );
        loaded
    }

    /// Adds or replaces a single artifact without touching the store.
    pub fn install(&self, name: ModelName, model: Arc<dyn FireClassifier>) {
        let next = self.snapshot().as_ref().clone().with(name, model);
        self.publish(next);
    }

    fn publish(&self, set: ModelSet) {
        let set = Arc::new(set);
        match self.current.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub fn snapshot(&self) -> Arc<ModelSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn loaded_names(&self) -> Vec<ModelName> {
        self.snapshot().names()
    }

    /// True when at least one artifact is loaded and predictions have not
    /// failed `error_threshold` times in a row since the last reload.
    pub fn is_model_available(&self) -> bool {
        !self.snapshot().is_empty()
            && self.consecutive_failures.load(Ordering::Acquire) < self.error_threshold
    }

    pub fn predict(&self, snapshot: &GameStateSnapshot) -> bool {
        self.predict_features(&feature_vector(snapshot))
    }

    /// First artifact in priority order that answers wins. Errors and panics
    /// fall through to the next one; nothing usable means "don't fire".
    pub fn predict_features(&self, features: &[f64]) -> bool {
        let set = self.snapshot();
        if set.is_empty() {
            return false;
        }

        for (name, model) in &set.entries {
            match catch_unwind(AssertUnwindSafe(|| model.predict(features))) {
                Ok(Ok(fire)) => {
                    self.consecutive_failures.store(0, Ordering::Release);
                    return fire;
                }
                Ok(Err(err)) => {
                    tracing::debug!(model = %name, "prediction failed: {err}");
                }
                Err(_) => {
                    tracing::warn!(model = %name, "{}", ArtifactError::Panicked);
                }
            }
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures == self.error_threshold {
            tracing::warn!(
                failures,
                "every loaded model keeps failing, falling back to heuristic fire control"
            );
        }
        false
    }
}
