// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// All variants are deterministic input-validation or numerical failures;
/// none are transient, so no operation retries internally.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EtscError {
    /// Malformed checkpoint configuration, raised at construction/fit time.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// Input series length does not align to a configured checkpoint.
    #[error("length mismatch: {0}")]
    LengthMismatch(String),
    /// Operation requires a fitted model.
    #[error("model is not fitted: {0}")]
    UnfittedModel(String),
    /// Probability-vector width disagrees with the fitted class count.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
    #[error("cancelled")]
    Cancelled,
}

impl EtscError {
    pub fn invalid_schedule(message: impl Into<String>) -> Self {
        Self::InvalidSchedule(message.into())
    }

    pub fn length_mismatch(message: impl Into<String>) -> Self {
        Self::LengthMismatch(message.into())
    }

    pub fn unfitted_model(message: impl Into<String>) -> Self {
        Self::UnfittedModel(message.into())
    }

    pub fn dimension_mismatch(message: impl Into<String>) -> Self {
        Self::DimensionMismatch(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn numerical_issue(message: impl Into<String>) -> Self {
        Self::NumericalIssue(message.into())
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::ResourceLimit(message.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }
}
