// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::EtscError;

/// Checkpoint configuration resolved against a full series length at fit
/// time.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// `count` equally spaced checkpoints, the last at full length.
    Uniform { count: usize },
    /// Explicit checkpoint lengths; the final checkpoint is forced to the
    /// full length (appended when absent).
    Explicit { lengths: Vec<usize> },
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self::Uniform { count: 20 }
    }
}

impl ScheduleSpec {
    /// Resolves the spec into a concrete schedule for `full_length`.
    pub fn resolve(&self, full_length: usize) -> Result<CheckpointSchedule, EtscError> {
        match self {
            Self::Uniform { count } => CheckpointSchedule::uniform(*count, full_length),
            Self::Explicit { lengths } => {
                CheckpointSchedule::from_lengths(lengths.clone(), full_length)
            }
        }
    }
}

/// Ascending series lengths at which decisions may be made.
///
/// Invariants: strictly increasing, no zero lengths, at least two entries,
/// last entry equal to the full series length.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointSchedule {
    lengths: Vec<usize>,
    full_length: usize,
}

impl CheckpointSchedule {
    /// Builds a schedule from explicit checkpoint lengths.
    ///
    /// The final checkpoint is forced to equal `full_length`: when the list
    /// does not already end there, `full_length` is appended.
    pub fn from_lengths(mut lengths: Vec<usize>, full_length: usize) -> Result<Self, EtscError> {
        if full_length == 0 {
            return Err(EtscError::invalid_schedule("full_length must be >= 1"));
        }

        for (index, &len) in lengths.iter().enumerate() {
            if len == 0 {
                return Err(EtscError::invalid_schedule(format!(
                    "checkpoint lengths must be >= 1; lengths[{index}]=0"
                )));
            }
            if len > full_length {
                return Err(EtscError::invalid_schedule(format!(
                    "checkpoint exceeds full length: lengths[{index}]={len}, full_length={full_length}"
                )));
            }
        }

        for index in 1..lengths.len() {
            if lengths[index - 1] >= lengths[index] {
                return Err(EtscError::invalid_schedule(format!(
                    "checkpoint lengths must be strictly increasing; \
                     lengths[{}]={} and lengths[{index}]={}",
                    index - 1,
                    lengths[index - 1],
                    lengths[index],
                )));
            }
        }

        if lengths.last() != Some(&full_length) {
            lengths.push(full_length);
        }

        if lengths.len() < 2 {
            return Err(EtscError::invalid_schedule(format!(
                "schedule requires at least 2 checkpoints; got {}",
                lengths.len()
            )));
        }

        Ok(Self {
            lengths,
            full_length,
        })
    }

    /// Builds `count` equally spaced checkpoints ending at `full_length`.
    pub fn uniform(count: usize, full_length: usize) -> Result<Self, EtscError> {
        if count < 2 {
            return Err(EtscError::invalid_schedule(format!(
                "schedule requires at least 2 checkpoints; got {count}"
            )));
        }
        if full_length < count {
            return Err(EtscError::invalid_schedule(format!(
                "full_length={full_length} is too short for {count} distinct checkpoints"
            )));
        }

        let lengths = (1..=count)
            .map(|step| full_length * step / count)
            .collect::<Vec<_>>();
        Self::from_lengths(lengths, full_length)
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn full_length(&self) -> usize {
        self.full_length
    }

    pub fn n_checkpoints(&self) -> usize {
        self.lengths.len()
    }

    /// Length at a schedule position.
    pub fn length_at(&self, position: usize) -> usize {
        self.lengths[position]
    }

    /// True when `position` is the last checkpoint.
    pub fn is_final(&self, position: usize) -> bool {
        position + 1 == self.lengths.len()
    }

    /// Schedule position of an exactly aligned length.
    pub fn position_of(&self, len: usize) -> Option<usize> {
        self.lengths.binary_search(&len).ok()
    }

    /// Schedule position of an aligned length, or a `LengthMismatch`.
    pub fn require_position(&self, len: usize) -> Result<usize, EtscError> {
        self.position_of(len).ok_or_else(|| {
            EtscError::length_mismatch(format!(
                "series length {len} does not align to any checkpoint; schedule={:?}",
                self.lengths
            ))
        })
    }
}
