// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Per-checkpoint safety scoring.
//!
//! Each checkpoint owns a scorer fitted on the probability features of the
//! training instances that were classified correctly at that prefix length.
//! A high score means the probability pattern resembles patterns that were
//! trustworthy during training.

use etsc_core::{argmax, EtscError};

const VARIANCE_FLOOR: f64 = 1e-6;

/// Probability-derived features used for safety scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafetyFeatures {
    /// Largest class probability.
    pub top_prob: f64,
    /// Gap between the largest and second-largest probability. With a
    /// single class this equals `top_prob`.
    pub margin: f64,
    /// 1.0 when the predicted label matches the previous checkpoint's
    /// prediction, 0.0 otherwise (including at the first checkpoint).
    pub consistency: f64,
}

/// Derives safety features and the predicted label from one probability row.
pub fn extract_features(
    row: &[f64],
    previous_predicted: Option<usize>,
) -> Result<(SafetyFeatures, usize), EtscError> {
    if row.is_empty() {
        return Err(EtscError::invalid_input(
            "probability row must be non-empty",
        ));
    }

    let predicted = argmax(row);
    let top_prob = row[predicted];
    let margin = if row.len() == 1 {
        top_prob
    } else {
        let mut second = f64::NEG_INFINITY;
        for (index, &value) in row.iter().enumerate() {
            if index != predicted && value > second {
                second = value;
            }
        }
        top_prob - second
    };
    let consistency = match previous_predicted {
        Some(previous) if previous == predicted => 1.0,
        _ => 0.0,
    };

    Ok((
        SafetyFeatures {
            top_prob,
            margin,
            consistency,
        },
        predicted,
    ))
}

/// Safety model for one checkpoint.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SafetyScorer {
    /// No training instance was classified correctly at this checkpoint;
    /// every score is negative infinity and nothing passes a finite
    /// threshold.
    NeverSafe,
    /// Diagonal Gaussian over (top_prob, margin, consistency), fitted on
    /// the correctly classified training instances.
    Gaussian { mean: [f64; 3], var: [f64; 3] },
}

impl SafetyScorer {
    /// Fits a scorer on per-instance features and correctness flags.
    pub fn fit(features: &[SafetyFeatures], correct: &[bool]) -> Result<Self, EtscError> {
        if features.len() != correct.len() {
            return Err(EtscError::invalid_input(format!(
                "got {} features for {} correctness flags",
                features.len(),
                correct.len()
            )));
        }

        let selected = features
            .iter()
            .zip(correct)
            .filter(|(_, &flag)| flag)
            .map(|(f, _)| [f.top_prob, f.margin, f.consistency])
            .collect::<Vec<_>>();
        if selected.is_empty() {
            return Ok(Self::NeverSafe);
        }

        let count = selected.len() as f64;
        let mut mean = [0.0f64; 3];
        for sample in &selected {
            for dim in 0..3 {
                mean[dim] += sample[dim];
            }
        }
        for value in mean.iter_mut() {
            *value /= count;
        }

        let mut var = [0.0f64; 3];
        for sample in &selected {
            for dim in 0..3 {
                let delta = sample[dim] - mean[dim];
                var[dim] += delta * delta;
            }
        }
        for value in var.iter_mut() {
            *value = (*value / count).max(VARIANCE_FLOOR);
        }

        for dim in 0..3 {
            if !mean[dim].is_finite() || !var[dim].is_finite() {
                return Err(EtscError::numerical_issue(format!(
                    "non-finite safety statistics in feature dimension {dim}"
                )));
            }
        }

        Ok(Self::Gaussian { mean, var })
    }

    /// Diagonal-Gaussian log-likelihood of the features, or negative
    /// infinity for `NeverSafe`.
    pub fn score(&self, features: &SafetyFeatures) -> f64 {
        match self {
            Self::NeverSafe => f64::NEG_INFINITY,
            Self::Gaussian { mean, var } => {
                let sample = [features.top_prob, features.margin, features.consistency];
                let mut log_likelihood = 0.0;
                for dim in 0..3 {
                    let delta = sample[dim] - mean[dim];
                    log_likelihood += -0.5 * (2.0 * std::f64::consts::PI * var[dim]).ln()
                        - delta * delta / (2.0 * var[dim]);
                }
                log_likelihood
            }
        }
    }
}
