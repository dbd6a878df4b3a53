// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Nearest-centroid probability provider.
//!
//! Stores one mean series per class and turns prefix distances into class
//! probabilities with a temperature softmax, so truncated batches can be
//! scored against the matching centroid prefixes.

use etsc_core::{EtscError, ExecutionContext, ProbabilityMatrix, ProbabilityProvider, SeriesBatchView};

use crate::snapshot::StatefulProvider;

const CANCEL_POLL_STRIDE: usize = 64;

/// Configuration for [`NearestCentroidProvider`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NearestCentroidConfig {
    /// Softmax temperature over negative mean squared distances. Lower
    /// values sharpen the distribution.
    pub temperature: f64,
}

impl Default for NearestCentroidConfig {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl NearestCentroidConfig {
    pub fn validate(&self) -> Result<(), EtscError> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(EtscError::invalid_input(format!(
                "temperature must be finite and > 0; got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Fitted per-class mean series, row-major `[class][time][channel]`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct CentroidModel {
    centroids: Vec<f64>,
    n_classes: usize,
    len: usize,
    n_channels: usize,
}

impl CentroidModel {
    fn class_stride(&self) -> usize {
        self.len * self.n_channels
    }

    fn validate(&self) -> Result<(), EtscError> {
        if self.n_classes == 0 || self.len == 0 || self.n_channels == 0 {
            return Err(EtscError::invalid_input(
                "centroid model dimensions must be >= 1",
            ));
        }
        let expected = self
            .n_classes
            .checked_mul(self.class_stride())
            .ok_or_else(|| EtscError::invalid_input("centroid model shape overflow"))?;
        if self.centroids.len() != expected {
            return Err(EtscError::invalid_input(format!(
                "centroid model has {} values, expected {expected}",
                self.centroids.len()
            )));
        }
        if self.centroids.iter().any(|value| !value.is_finite()) {
            return Err(EtscError::invalid_input(
                "centroid model contains non-finite values",
            ));
        }
        Ok(())
    }
}

/// Probability provider backed by per-class mean series.
#[derive(Clone, Debug)]
pub struct NearestCentroidProvider {
    config: NearestCentroidConfig,
    model: Option<CentroidModel>,
}

impl NearestCentroidProvider {
    pub fn new(config: NearestCentroidConfig) -> Result<Self, EtscError> {
        config.validate()?;
        Ok(Self {
            config,
            model: None,
        })
    }

    pub fn config(&self) -> &NearestCentroidConfig {
        &self.config
    }

    fn fitted(&self) -> Result<&CentroidModel, EtscError> {
        self.model
            .as_ref()
            .ok_or_else(|| EtscError::unfitted_model("nearest-centroid provider requires fit"))
    }
}

impl Default for NearestCentroidProvider {
    fn default() -> Self {
        Self {
            config: NearestCentroidConfig::default(),
            model: None,
        }
    }
}

impl ProbabilityProvider for NearestCentroidProvider {
    fn fit(
        &mut self,
        train: &SeriesBatchView<'_>,
        labels: &[usize],
        ctx: &ExecutionContext<'_>,
    ) -> Result<(), EtscError> {
        if labels.len() != train.n_instances {
            return Err(EtscError::invalid_input(format!(
                "got {} labels for {} training instances",
                labels.len(),
                train.n_instances
            )));
        }

        let n_classes = labels
            .iter()
            .max()
            .map(|&max| max + 1)
            .ok_or_else(|| EtscError::invalid_input("fit requires at least one instance"))?;
        let mut counts = vec![0usize; n_classes];
        for &label in labels {
            counts[label] += 1;
        }
        for (class, &count) in counts.iter().enumerate() {
            if count == 0 {
                return Err(EtscError::invalid_input(format!(
                    "class {class} has no training instances"
                )));
            }
        }

        let stride = train.instance_stride();
        let mut sums = vec![0.0f64; n_classes * stride];
        for instance in 0..train.n_instances {
            ctx.check_cancelled_every(instance, CANCEL_POLL_STRIDE)?;
            let series = train.instance(instance).ok_or_else(|| {
                EtscError::invalid_input(format!("instance {instance} out of range"))
            })?;
            let base = labels[instance] * stride;
            for (offset, &value) in series.iter().enumerate() {
                if !value.is_finite() {
                    return Err(EtscError::invalid_input(format!(
                        "training values must be finite; instance {instance}, offset {offset}"
                    )));
                }
                sums[base + offset] += value;
            }
        }
        for class in 0..n_classes {
            let inverse = 1.0 / counts[class] as f64;
            for offset in 0..stride {
                sums[class * stride + offset] *= inverse;
            }
        }

        let model = CentroidModel {
            centroids: sums,
            n_classes,
            len: train.len,
            n_channels: train.n_channels,
        };
        model.validate()?;
        self.model = Some(model);
        Ok(())
    }

    fn n_classes(&self) -> Option<usize> {
        self.model.as_ref().map(|model| model.n_classes)
    }

    fn predict_proba(
        &self,
        batch: &SeriesBatchView<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ProbabilityMatrix, EtscError> {
        let model = self.fitted()?;
        if batch.n_channels != model.n_channels {
            return Err(EtscError::dimension_mismatch(format!(
                "batch has {} channels, model was fitted with {}",
                batch.n_channels, model.n_channels
            )));
        }
        if batch.len > model.len {
            return Err(EtscError::invalid_input(format!(
                "batch length {} exceeds fitted length {}",
                batch.len, model.len
            )));
        }

        let prefix = batch.len * batch.n_channels;
        let class_stride = model.class_stride();
        let mut values = Vec::with_capacity(batch.n_instances * model.n_classes);

        for instance in 0..batch.n_instances {
            ctx.check_cancelled_every(instance, CANCEL_POLL_STRIDE)?;
            let series = batch.instance(instance).ok_or_else(|| {
                EtscError::invalid_input(format!("instance {instance} out of range"))
            })?;

            let mut scaled = Vec::with_capacity(model.n_classes);
            for class in 0..model.n_classes {
                let start = class * class_stride;
                let centroid = &model.centroids[start..start + prefix];
                let mse = series
                    .iter()
                    .zip(centroid)
                    .map(|(value, center)| {
                        let delta = value - center;
                        delta * delta
                    })
                    .sum::<f64>()
                    / prefix as f64;
                scaled.push(-mse / self.config.temperature);
            }

            // Max-subtracted softmax; the matrix constructor renormalizes.
            let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !max.is_finite() {
                return Err(EtscError::numerical_issue(format!(
                    "non-finite distance scores for instance {instance}"
                )));
            }
            values.extend(scaled.iter().map(|&score| (score - max).exp()));
        }

        ProbabilityMatrix::new(values, batch.n_instances, model.n_classes)
    }
}

impl StatefulProvider for NearestCentroidProvider {
    fn save_payload(&self) -> Result<Vec<u8>, EtscError> {
        let model = self.fitted()?;
        bincode::serialize(model).map_err(|err| {
            EtscError::invalid_input(format!("failed to encode centroid payload: {err}"))
        })
    }

    fn load_payload(&mut self, payload: &[u8]) -> Result<(), EtscError> {
        let model: CentroidModel = bincode::deserialize(payload).map_err(|err| {
            EtscError::invalid_input(format!("failed to decode centroid payload: {err}"))
        })?;
        model.validate()?;
        self.model = Some(model);
        Ok(())
    }
}
