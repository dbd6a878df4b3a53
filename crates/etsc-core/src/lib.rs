// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Core shared types and traits for early time-series classification:
//! the error taxonomy, series batch views, the probability-provider
//! contract, checkpoint schedules, per-instance decision state, and the
//! execution context threaded through fit/predict calls.

pub mod control;
pub mod error;
pub mod provider;
pub mod schedule;
pub mod series;
pub mod state;

pub use control::{CancelToken, Constraints, ExecutionContext};
pub use error::EtscError;
pub use provider::{argmax, ProbabilityMatrix, ProbabilityProvider};
pub use schedule::{CheckpointSchedule, ScheduleSpec};
pub use series::{SeriesBatch, SeriesBatchView};
pub use state::DecisionState;
