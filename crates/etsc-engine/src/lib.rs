// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Early time-series classification engine.
//!
//! The engine walks a batch of series through a checkpoint schedule, asking
//! a pluggable probability provider for class probabilities at each prefix
//! length. A per-checkpoint safety scorer decides when a prediction can be
//! committed early; the final checkpoint always commits. Fitted classifiers
//! can be persisted to versioned, checksummed snapshots.

pub mod centroid;
pub mod engine;
pub mod safety;
pub mod snapshot;

pub use centroid::{NearestCentroidConfig, NearestCentroidProvider};
pub use engine::{EarlyClassifier, EarlyClassifierConfig, FittedHead, StepOutcome};
pub use safety::{extract_features, SafetyFeatures, SafetyScorer};
pub use snapshot::{
    engine_fingerprint, load_snapshot_file, read_snapshot, save_snapshot_file, write_snapshot,
    EngineSnapshot, PayloadCodec, SnapshotEnvelope, StatefulProvider,
    MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION, SNAPSHOT_SCHEMA_VERSION,
};
