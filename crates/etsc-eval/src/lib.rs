// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Scoring metrics for early time-series classification: accuracy,
//! earliness, and their harmonic-mean combination. All functions are pure
//! and deterministic given their inputs.

use etsc_core::EtscError;

/// Final committed decision for one instance.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalDecision {
    /// Committed class label.
    pub label: usize,
    /// Series length at which the decision was committed.
    pub decision_length: usize,
}

/// Aggregate score over a batch of final decisions.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EarlyScore {
    /// Harmonic mean of accuracy and (1 - earliness).
    pub harmonic_mean: f64,
    /// Fraction of decided labels equal to ground truth.
    pub accuracy: f64,
    /// Mean decision_length / full_length over instances.
    pub earliness: f64,
}

/// Fraction of predicted labels equal to ground truth.
pub fn accuracy(predicted: &[usize], truth: &[usize]) -> Result<f64, EtscError> {
    if predicted.is_empty() {
        return Err(EtscError::invalid_input(
            "accuracy requires at least one instance",
        ));
    }
    if predicted.len() != truth.len() {
        return Err(EtscError::invalid_input(format!(
            "accuracy requires matching lengths; predicted={}, truth={}",
            predicted.len(),
            truth.len()
        )));
    }

    let hits = predicted
        .iter()
        .zip(truth)
        .filter(|(lhs, rhs)| lhs == rhs)
        .count();
    Ok(hits as f64 / predicted.len() as f64)
}

/// Mean fraction of the full series length used to reach a decision.
pub fn earliness(decision_lengths: &[usize], full_length: usize) -> Result<f64, EtscError> {
    if full_length == 0 {
        return Err(EtscError::invalid_input("full_length must be >= 1"));
    }
    if decision_lengths.is_empty() {
        return Err(EtscError::invalid_input(
            "earliness requires at least one instance",
        ));
    }
    for (index, &len) in decision_lengths.iter().enumerate() {
        if len == 0 || len > full_length {
            return Err(EtscError::invalid_input(format!(
                "decision length must be in 1..={full_length}; decision_lengths[{index}]={len}"
            )));
        }
    }

    let total: f64 = decision_lengths
        .iter()
        .map(|&len| len as f64 / full_length as f64)
        .sum();
    Ok(total / decision_lengths.len() as f64)
}

/// Harmonic mean of accuracy and (1 - earliness).
///
/// Defined as 0 when the denominator is 0, so a batch decided entirely at
/// full length scores 0 regardless of accuracy.
pub fn harmonic_mean(accuracy: f64, earliness: f64) -> f64 {
    let complement = 1.0 - earliness;
    let denominator = complement + accuracy;
    if !(denominator > 0.0) {
        return 0.0;
    }
    2.0 * complement * accuracy / denominator
}

/// Computes the aggregate score for a batch of final decisions.
pub fn early_score(
    decisions: &[FinalDecision],
    truth: &[usize],
    full_length: usize,
) -> Result<EarlyScore, EtscError> {
    let labels = decisions
        .iter()
        .map(|decision| decision.label)
        .collect::<Vec<_>>();
    let lengths = decisions
        .iter()
        .map(|decision| decision.decision_length)
        .collect::<Vec<_>>();

    let accuracy = accuracy(&labels, truth)?;
    let earliness = earliness(&lengths, full_length)?;
    Ok(EarlyScore {
        harmonic_mean: harmonic_mean(accuracy, earliness),
        accuracy,
        earliness,
    })
}
