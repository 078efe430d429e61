use super::{check_dimension, StandardScaler};
use crate::error::ArtifactError;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct KnnParams {
    pub k: usize,
    /// Upper bound on stored reference points; larger training sets are
    /// subsampled so a single prediction stays cheap enough for a frame.
    pub max_reference: usize,
    pub seed: u64,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            k: 5,
            max_reference: 4096,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnnModel {
    pub scaler: StandardScaler,
    pub k: usize,
    pub points: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl KnnModel {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &KnnParams) -> Self {
        let scaler = StandardScaler::fit(x);
        let keep: Vec<usize> = if x.len() > params.max_reference {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
            let mut picked = index::sample(&mut rng, x.len(), params.max_reference).into_vec();
            picked.sort_unstable();
            picked
        } else {
            (0..x.len()).collect()
        };

        Self {
            points: keep.iter().map(|&i| scaler.transform(&x[i])).collect(),
            labels: keep.iter().map(|&i| y[i]).collect(),
            k: params.k.max(1),
            scaler,
        }
    }

    /// Share of fire labels among the `k` nearest reference points.
    pub fn probability(&self, features: &[f64]) -> Result<f64, ArtifactError> {
        check_dimension(self.scaler.dims(), features)?;
        let query = self.scaler.transform(features);
        let k = self.k.min(self.points.len());
        if k == 0 {
            return Err(ArtifactError::Malformed("knn reference set is empty"));
        }

        // Sorted ascending by distance, at most k entries.
        let mut nearest: Vec<(f64, u8)> = Vec::with_capacity(k + 1);
        for (point, &label) in self.points.iter().zip(&self.labels) {
            let d2: f64 = point.iter().zip(&query).map(|(a, b)| (a - b) * (a - b)).sum();
            if nearest.len() == k && d2 >= nearest[k - 1].0 {
                continue;
            }
            let at = nearest.partition_point(|(d, _)| *d <= d2);
            nearest.insert(at, (d2, label));
            nearest.truncate(k);
        }

        let fires = nearest.iter().filter(|(_, label)| *label == 1).count();
        Ok(fires as f64 / k as f64)
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        self.scaler.validate(n_features)?;
        if self.points.is_empty() || self.points.len() != self.labels.len() || self.k == 0 {
            return Err(ArtifactError::Malformed("knn reference set is inconsistent"));
        }
        if let Some(bad) = self.points.iter().find(|p| p.len() != n_features) {
            return Err(ArtifactError::DimensionMismatch {
                expected: n_features,
                actual: bad.len(),
            });
        }
        if self.labels.iter().any(|&label| label > 1) {
            return Err(ArtifactError::Malformed("knn labels must be 0 or 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f64 * 0.1;
            x.push(vec![0.0 + jitter, 0.0]);
            y.push(1);
            x.push(vec![10.0 + jitter, 10.0]);
            y.push(0);
        }
        (x, y)
    }

    #[test]
    fn votes_follow_nearest_cluster() {
        let (x, y) = clusters();
        let model = KnnModel::fit(&x, &y, &KnnParams::default());
        assert_eq!(model.probability(&[0.2, 0.1]).unwrap(), 1.0);
        assert_eq!(model.probability(&[9.8, 10.0]).unwrap(), 0.0);
    }

    #[test]
    fn reference_set_is_capped_deterministically() {
        let (x, y) = clusters();
        let params = KnnParams {
            max_reference: 10,
            ..KnnParams::default()
        };
        let a = KnnModel::fit(&x, &y, &params);
        let b = KnnModel::fit(&x, &y, &params);
        assert_eq!(a.points.len(), 10);
        assert_eq!(a.points, b.points);
        assert!(a.validate(2).is_ok());
    }
}
