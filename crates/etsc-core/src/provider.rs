// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{EtscError, ExecutionContext, SeriesBatchView};

/// Row-major matrix of per-instance class probabilities.
///
/// Construction validates that every entry is finite and non-negative and
/// renormalizes each row to sum to one; providers may therefore emit
/// unnormalized non-negative scores.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityMatrix {
    values: Vec<f64>,
    n_rows: usize,
    n_classes: usize,
}

impl ProbabilityMatrix {
    /// Builds and normalizes a probability matrix.
    pub fn new(mut values: Vec<f64>, n_rows: usize, n_classes: usize) -> Result<Self, EtscError> {
        if n_rows == 0 {
            return Err(EtscError::invalid_input("n_rows must be >= 1"));
        }
        if n_classes == 0 {
            return Err(EtscError::invalid_input("n_classes must be >= 1"));
        }
        let expected_len = n_rows.checked_mul(n_classes).ok_or_else(|| {
            EtscError::invalid_input("n_rows*n_classes overflow while validating shape")
        })?;
        if values.len() != expected_len {
            return Err(EtscError::invalid_input(format!(
                "probability matrix length mismatch: got {}, expected {expected_len} \
                 (n_rows={n_rows}, n_classes={n_classes})",
                values.len()
            )));
        }

        for (index, value) in values.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 {
                return Err(EtscError::invalid_input(format!(
                    "probabilities must be finite and >= 0; values[{index}]={value}"
                )));
            }
        }

        for row in 0..n_rows {
            let start = row * n_classes;
            let slice = &mut values[start..start + n_classes];
            let mass: f64 = slice.iter().sum();
            if mass <= 0.0 {
                return Err(EtscError::numerical_issue(format!(
                    "probability row {row} has zero total mass"
                )));
            }
            if (mass - 1.0).abs() > 1e-9 {
                for value in slice.iter_mut() {
                    *value /= mass;
                }
            }
        }

        Ok(Self {
            values,
            n_rows,
            n_classes,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Borrows one probability row.
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.n_classes;
        &self.values[start..start + self.n_classes]
    }

    /// Errors when the matrix shape disagrees with the expected batch and
    /// fitted class count.
    pub fn ensure_shape(&self, n_rows: usize, n_classes: usize) -> Result<(), EtscError> {
        if self.n_rows != n_rows {
            return Err(EtscError::invalid_input(format!(
                "provider returned {} rows for a batch of {n_rows} instances",
                self.n_rows
            )));
        }
        if self.n_classes != n_classes {
            return Err(EtscError::dimension_mismatch(format!(
                "provider returned {} classes, model was fitted with {n_classes}",
                self.n_classes
            )));
        }
        Ok(())
    }
}

/// Index of the largest value, by total order; ties resolve to the first.
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Contract for base classifiers capable of partial-length inference.
///
/// Implementations must accept truncated-length batches at inference and
/// return one probability row per instance, with width equal to the class
/// count seen during fit.
pub trait ProbabilityProvider {
    /// Trains the provider on full-length series with class labels in
    /// `0..n_classes`.
    fn fit(
        &mut self,
        train: &SeriesBatchView<'_>,
        labels: &[usize],
        ctx: &ExecutionContext<'_>,
    ) -> Result<(), EtscError>;

    /// Class count seen during fit, `None` before fitting.
    fn n_classes(&self) -> Option<usize>;

    /// Class probabilities for a (possibly truncated) batch.
    fn predict_proba(
        &self,
        batch: &SeriesBatchView<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ProbabilityMatrix, EtscError>;
}
