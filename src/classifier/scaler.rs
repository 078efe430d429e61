use crate::error::ArtifactError;
use serde::{Deserialize, Serialize};

/// Per-column standardisation `(x - mean) / scale`. Constant columns get a
/// scale of 1 so they map to zero instead of dividing by zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; dims];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; dims];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                let d = v - m;
                *acc += d * d;
            }
        }
        let scale = var
            .into_iter()
            .map(|acc| {
                let std = (acc / n).sqrt();
                if std > 1e-12 && std.is_finite() {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Self { mean, scale }
    }

    pub fn dims(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform(row)).collect()
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        if self.mean.len() != n_features || self.scale.len() != n_features {
            return Err(ArtifactError::DimensionMismatch {
                expected: n_features,
                actual: self.mean.len(),
            });
        }
        let finite = self.mean.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0);
        if !finite {
            return Err(ArtifactError::Malformed("scaler has non-finite or zero scale"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardises_and_keeps_constant_columns_finite() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows);
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
        assert!(scaler.validate(2).is_ok());
        assert!(scaler.validate(3).is_err());
    }
}
