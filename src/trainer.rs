//! Offline training job: telemetry log in, one artifact per model family out.
//!
//! Runs as its own process (`invasion-autopilot train`) so a crash here never
//! reaches the game loop. Evaluation numbers are diagnostic only; every family
//! is persisted whatever its score.

use crate::classifier::{
    save_artifact, ClassifierArtifact, FireClassifier, ForestModel, ForestParams, KnnModel,
    KnnParams, LogisticModel, LogisticParams, ModelName,
};
use crate::error::TrainError;
use crate::features::{FEATURE_COLUMNS, LABEL_COLUMN};
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const REPORT_FILE_NAME: &str = "training-report.json";

#[derive(Clone, Debug)]
pub struct TrainerConfig {
    pub data_path: PathBuf,
    pub models_dir: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
    pub logistic: LogisticParams,
    pub knn: KnnParams,
    pub forest: ForestParams,
}

impl TrainerConfig {
    pub fn new(data_path: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            models_dir: models_dir.into(),
            seed: DEFAULT_SEED,
            test_fraction: DEFAULT_TEST_FRACTION,
            logistic: LogisticParams::default(),
            knn: KnnParams::default(),
            forest: ForestParams::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.knn.seed = seed;
        self.forest.seed = seed;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    pub dropped_rows: usize,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y == 1).count()
    }

    fn subset(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<u8>) {
        (
            indices.iter().map(|&i| self.features[i].clone()).collect(),
            indices.iter().map(|&i| self.labels[i]).collect(),
        )
    }
}

/// Parse a telemetry log. Columns are located by header name; rows that fail
/// to decode or carry no readable label are dropped and every other missing or
/// unreadable cell becomes `0.0`.
pub fn load_dataset(path: &Path) -> Result<Dataset, TrainError> {
    let csv_err = |source| TrainError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let header = reader.headers().map_err(csv_err)?.clone();
    if header.iter().all(str::is_empty) {
        return Err(TrainError::MissingHeader(path.to_path_buf()));
    }
    let label_idx = header
        .iter()
        .position(|column| column == LABEL_COLUMN)
        .ok_or(TrainError::MissingLabelColumn(LABEL_COLUMN))?;
    let feature_idx: Vec<Option<usize>> = FEATURE_COLUMNS
        .iter()
        .map(|name| header.iter().position(|column| column == *name))
        .collect();

    let mut dataset = Dataset::default();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(path = %path.display(), "skipping undecodable row: {err}");
                dataset.dropped_rows += 1;
                continue;
            }
        };
        let Some(label) = record.get(label_idx).and_then(parse_label) else {
            dataset.dropped_rows += 1;
            continue;
        };
        let row = feature_idx
            .iter()
            .map(|idx| {
                idx.and_then(|i| record.get(i))
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0)
            })
            .collect();
        dataset.features.push(row);
        dataset.labels.push(label);
    }
    Ok(dataset)
}

fn parse_label(cell: &str) -> Option<u8> {
    let value = cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(u8::from(value >= 0.5))
}

/// Shuffle each class separately and carve `test_fraction` of it off, so both
/// sides keep the class ratio. A class with two or more rows always lands on
/// both sides.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in [0u8, 1] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        members.shuffle(&mut rng);
        let n = members.len();
        let n_test = if n >= 2 {
            ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1)
        } else {
            0
        };
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    (train, test)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BinaryMetrics {
    pub support: usize,
    pub accuracy: f64,
    /// `[[tn, fp], [fn, tp]]`, rows are the true label.
    pub confusion: [[usize; 2]; 2],
    pub precision: [f64; 2],
    pub recall: [f64; 2],
    pub roc_auc: Option<f64>,
}

impl BinaryMetrics {
    pub fn compute(labels: &[u8], scores: &[f64]) -> Self {
        let mut confusion = [[0usize; 2]; 2];
        for (&label, &score) in labels.iter().zip(scores) {
            let predicted = usize::from(score >= 0.5);
            confusion[label as usize][predicted] += 1;
        }
        let support = labels.len();
        let correct = confusion[0][0] + confusion[1][1];
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let precision = [
            ratio(confusion[0][0], confusion[0][0] + confusion[1][0]),
            ratio(confusion[1][1], confusion[1][1] + confusion[0][1]),
        ];
        let recall = [
            ratio(confusion[0][0], confusion[0][0] + confusion[0][1]),
            ratio(confusion[1][1], confusion[1][1] + confusion[1][0]),
        ];

        Self {
            support,
            accuracy: ratio(correct, support),
            confusion,
            precision,
            recall,
            roc_auc: roc_auc(labels, scores),
        }
    }
}

/// Mann-Whitney form of the ROC AUC with average ranks for ties. `None` when
/// either class is absent.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end share their average.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            if labels[i] == 1 {
                positive_rank_sum += avg_rank;
            }
        }
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

#[derive(Clone, Debug, Serialize)]
pub struct FamilyReport {
    pub name: ModelName,
    pub family: &'static str,
    pub artifact_path: PathBuf,
    pub metrics: BinaryMetrics,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainingReport {
    pub data_path: PathBuf,
    pub models_dir: PathBuf,
    pub seed: u64,
    pub trained_unix_s: u64,
    pub rows_total: usize,
    pub rows_dropped: usize,
    pub positives: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub families: Vec<FamilyReport>,
}

impl TrainingReport {
    pub fn best(&self) -> Option<&FamilyReport> {
        self.families
            .iter()
            .max_by(|a, b| a.metrics.accuracy.total_cmp(&b.metrics.accuracy))
    }
}

pub fn fit_family(
    name: ModelName,
    x: &[Vec<f64>],
    y: &[u8],
    config: &TrainerConfig,
) -> Result<ClassifierArtifact> {
    Ok(match name {
        ModelName::Logreg => ClassifierArtifact::Logistic(LogisticModel::fit(x, y, &config.logistic)?),
        ModelName::Rf => ClassifierArtifact::Forest(ForestModel::fit(x, y, &config.forest)),
        ModelName::Knn => ClassifierArtifact::Knn(KnnModel::fit(x, y, &config.knn)),
    })
}

pub fn run_training(config: &TrainerConfig) -> Result<TrainingReport> {
    let dataset = load_dataset(&config.data_path)?;
    if dataset.is_empty() {
        return Err(TrainError::EmptyDataset.into());
    }
    let positives = dataset.positives();
    if positives == 0 || positives == dataset.len() {
        let label = u8::from(positives > 0);
        return Err(TrainError::SingleClass {
            label,
            count: dataset.len(),
        }
        .into());
    }

    let (train_idx, test_idx) = stratified_split(&dataset.labels, config.test_fraction, config.seed);
    let (train_x, train_y) = dataset.subset(&train_idx);
    let (test_x, test_y) = dataset.subset(&test_idx);
    tracing::info!(
        data = %config.data_path.display(),
        rows = dataset.len(),
        dropped = dataset.dropped_rows,
        positives,
        train = train_y.len(),
        test = test_y.len(),
        "training fire classifiers"
    );

    let trained = ModelName::PRIORITY
        .par_iter()
        .map(|&name| {
            fit_family(name, &train_x, &train_y, config)
                .map(|model| (name, model))
                .with_context(|| format!("failed fitting {name}"))
        })
        .collect::<Result<Vec<(ModelName, ClassifierArtifact)>>>()?;

    let trained_unix_s = now_unix_s();
    let mut families = Vec::with_capacity(trained.len());
    for (name, model) in trained {
        let scores = test_x
            .iter()
            .map(|row| model.predict_probability(row))
            .collect::<Result<Vec<f64>, _>>()
            .with_context(|| format!("evaluating {name} on the held-out split"))?;
        let metrics = BinaryMetrics::compute(&test_y, &scores);
        let artifact_path = save_artifact(&config.models_dir, name, &model, trained_unix_s)
            .with_context(|| format!("failed saving {name} artifact"))?;

        tracing::info!(
            model = %name,
            accuracy = metrics.accuracy,
            auc = ?metrics.roc_auc,
            tn = metrics.confusion[0][0],
            fp = metrics.confusion[0][1],
            fn_ = metrics.confusion[1][0],
            tp = metrics.confusion[1][1],
            "trained"
        );
        families.push(FamilyReport {
            name,
            family: model.family(),
            artifact_path,
            metrics,
        });
    }

    let report = TrainingReport {
        data_path: config.data_path.clone(),
        models_dir: config.models_dir.clone(),
        seed: config.seed,
        trained_unix_s,
        rows_total: dataset.len(),
        rows_dropped: dataset.dropped_rows,
        positives,
        train_rows: train_y.len(),
        test_rows: test_y.len(),
        families,
    };
    write_json(&config.models_dir.join(REPORT_FILE_NAME), &report)?;
    Ok(report)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let encoded = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, encoded).with_context(|| format!("failed writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed replacing {}", path.display()))
}

fn now_unix_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
