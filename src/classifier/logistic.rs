use super::{balanced_class_weights, check_dimension, StandardScaler};
use crate::error::ArtifactError;
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Init, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct LogisticParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            epochs: 600,
            learning_rate: 0.05,
            weight_decay: 1e-4,
        }
    }
}

/// Standardised features followed by a single linear unit trained with a
/// class-weighted binary cross-entropy. Training runs on candle; the fitted
/// coefficients are exported as plain numbers so inference needs no tensors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogisticModel {
    pub scaler: StandardScaler,
    pub weights: Vec<f64>,
    pub bias: f64,
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Mean of `w_i * bce(z_i, y_i)` using the overflow-free form
/// `max(z, 0) - z y + ln(1 + e^-|z|)`.
fn weighted_bce_with_logits(
    logits: &Tensor,
    targets: &Tensor,
    weights: &Tensor,
    total_weight: f64,
) -> candle_core::Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let per_sample = logits
        .relu()?
        .sub(&logits.mul(targets)?)?
        .add(&softplus)?;
    per_sample
        .mul(weights)?
        .sum_all()?
        .affine(1.0 / total_weight, 0.0)
}

impl LogisticModel {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &LogisticParams) -> Result<Self> {
        let scaler = StandardScaler::fit(x);
        let dims = scaler.dims();
        let n = x.len();
        let class_weight = balanced_class_weights(y);
        let sample_weight: Vec<f64> = y.iter().map(|&label| class_weight[label as usize]).collect();
        let total_weight = sample_weight.iter().sum::<f64>().max(f64::MIN_POSITIVE);

        let device = Device::Cpu;
        let flat: Vec<f64> = x.iter().flat_map(|row| scaler.transform(row)).collect();
        let inputs = Tensor::from_vec(flat, (n, dims), &device)?;
        let labels: Vec<f64> = y.iter().map(|&label| f64::from(label)).collect();
        let targets = Tensor::from_vec(labels, n, &device)?;
        let weights = Tensor::from_vec(sample_weight, n, &device)?;

        // Deterministic zero init.
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, &device);
        let weight = vb.get_with_hints((1usize, dims), "weight", Init::Const(0.0))?;
        let bias = vb.get_with_hints(1usize, "bias", Init::Const(0.0))?;
        let linear = Linear::new(weight, Some(bias));

        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: params.learning_rate,
                weight_decay: params.weight_decay,
                ..Default::default()
            },
        )?;
        for _ in 0..params.epochs {
            let logits = linear.forward(&inputs)?.squeeze(1)?;
            let loss = weighted_bce_with_logits(&logits, &targets, &weights, total_weight)?;
            optimizer.backward_step(&loss)?;
        }

        let weights = linear.weight().flatten_all()?.to_vec1::<f64>()?;
        let bias = match linear.bias() {
            Some(bias) => bias.to_vec1::<f64>()?.first().copied().unwrap_or(0.0),
            None => 0.0,
        };
        let model = Self {
            scaler,
            weights,
            bias,
        };
        model.validate(dims).context("logistic fit diverged")?;
        Ok(model)
    }

    pub fn probability(&self, features: &[f64]) -> Result<f64, ArtifactError> {
        check_dimension(self.weights.len(), features)?;
        let scaled = self.scaler.transform(features);
        Ok(sigmoid(self.bias + dot(&self.weights, &scaled)))
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        self.scaler.validate(n_features)?;
        if self.weights.len() != n_features {
            return Err(ArtifactError::DimensionMismatch {
                expected: n_features,
                actual: self.weights.len(),
            });
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ArtifactError::Malformed("logistic coefficients are not finite"));
        }
        Ok(())
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
