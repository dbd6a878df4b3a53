// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::EtscError;

/// Per-instance decision state carried by the caller across streaming
/// checkpoint calls.
///
/// A fresh state means "no decision yet". Once `decided` is set the state
/// is terminal: later checkpoints must not alter the committed
/// probabilities, label, or decision length.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionState {
    /// Schedule position of the last checkpoint visited.
    pub last_checkpoint: Option<usize>,
    /// Committed probability vector once decided; the most recent one while
    /// pending.
    pub probabilities: Vec<f64>,
    /// Predicted class label for `probabilities`.
    pub predicted: usize,
    /// True once a safe decision has been emitted.
    pub decided: bool,
    /// Series length at which the decision was emitted.
    pub decided_at_len: Option<usize>,
    /// Safety score backing the most recent evaluation.
    pub safety_score: f64,
}

impl DecisionState {
    /// State for an instance that has not visited any checkpoint.
    pub fn fresh() -> Self {
        Self {
            last_checkpoint: None,
            probabilities: Vec::new(),
            predicted: 0,
            decided: false,
            decided_at_len: None,
            safety_score: f64::NEG_INFINITY,
        }
    }

    /// Checks internal consistency of a caller-supplied state.
    pub fn validate(&self) -> Result<(), EtscError> {
        if self.decided {
            if self.decided_at_len.is_none() {
                return Err(EtscError::invalid_input(
                    "decided state requires decided_at_len",
                ));
            }
            if self.last_checkpoint.is_none() {
                return Err(EtscError::invalid_input(
                    "decided state requires a visited checkpoint",
                ));
            }
            if self.probabilities.is_empty() {
                return Err(EtscError::invalid_input(
                    "decided state requires a committed probability vector",
                ));
            }
        } else if self.decided_at_len.is_some() {
            return Err(EtscError::invalid_input(
                "pending state must not carry decided_at_len",
            ));
        }

        if self.last_checkpoint.is_none() && !self.probabilities.is_empty() {
            return Err(EtscError::invalid_input(
                "state with probabilities requires a visited checkpoint",
            ));
        }

        if !self.probabilities.is_empty() {
            if self.predicted >= self.probabilities.len() {
                return Err(EtscError::invalid_input(format!(
                    "predicted label {} out of range for {} classes",
                    self.predicted,
                    self.probabilities.len()
                )));
            }
            for (index, value) in self.probabilities.iter().enumerate() {
                if !value.is_finite() || *value < 0.0 || *value > 1.0 {
                    return Err(EtscError::invalid_input(format!(
                        "state probabilities must be finite and in [0,1]; \
                         probabilities[{index}]={value}"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for DecisionState {
    fn default() -> Self {
        Self::fresh()
    }
}
