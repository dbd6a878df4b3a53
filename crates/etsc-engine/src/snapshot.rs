// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Snapshot persistence for fitted classifiers.
//!
//! A snapshot wraps the decision head and the provider's serialized model
//! in a versioned envelope with a CRC32 over the encoded payload, so a
//! restored classifier reproduces the exact decisions of the one that was
//! saved.

use etsc_core::{EtscError, ProbabilityProvider};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::{EarlyClassifier, FittedHead};

/// Current envelope schema version.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;
/// Oldest schema version this build can still read.
pub const MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Providers whose fitted model can be serialized into a snapshot.
pub trait StatefulProvider: ProbabilityProvider {
    /// Serializes the fitted model.
    fn save_payload(&self) -> Result<Vec<u8>, EtscError>;

    /// Replaces the fitted model with a previously saved one.
    fn load_payload(&mut self, payload: &[u8]) -> Result<(), EtscError>;
}

/// Payload encoding inside the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCodec {
    Json,
    Bincode,
}

/// Versioned, integrity-checked container for a serialized snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotEnvelope {
    /// Caller-chosen identifier checked on restore.
    pub model_id: String,
    pub state_schema_version: u32,
    /// Engine build that wrote the snapshot, informational only.
    pub engine_fingerprint: String,
    pub created_at_ns: u64,
    pub payload_codec: PayloadCodec,
    pub payload_crc32: u32,
    pub payload: Vec<u8>,
}

/// Serializable snapshot of a fitted classifier.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineSnapshot {
    pub head: FittedHead,
    pub provider_payload: Vec<u8>,
}

/// Encodes a snapshot into a fresh envelope.
pub fn write_snapshot(
    model_id: &str,
    snapshot: &EngineSnapshot,
    codec: PayloadCodec,
) -> Result<SnapshotEnvelope, EtscError> {
    if model_id.is_empty() {
        return Err(EtscError::invalid_input("model_id must be non-empty"));
    }
    let payload = match codec {
        PayloadCodec::Json => serde_json::to_vec(snapshot).map_err(|err| {
            EtscError::invalid_input(format!("failed to encode snapshot payload: {err}"))
        })?,
        PayloadCodec::Bincode => bincode::serialize(snapshot).map_err(|err| {
            EtscError::invalid_input(format!("failed to encode snapshot payload: {err}"))
        })?,
    };

    Ok(SnapshotEnvelope {
        model_id: model_id.to_owned(),
        state_schema_version: SNAPSHOT_SCHEMA_VERSION,
        engine_fingerprint: engine_fingerprint(),
        created_at_ns: now_unix_ns(),
        payload_codec: codec,
        payload_crc32: crc32fast::hash(&payload),
        payload,
    })
}

/// Validates an envelope and decodes its snapshot.
pub fn read_snapshot(
    envelope: &SnapshotEnvelope,
    expected_model_id: &str,
) -> Result<EngineSnapshot, EtscError> {
    if envelope.model_id != expected_model_id {
        return Err(EtscError::invalid_input(format!(
            "snapshot model_id mismatch: stored \"{}\", expected \"{expected_model_id}\"",
            envelope.model_id
        )));
    }
    if envelope.state_schema_version < MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION
        || envelope.state_schema_version > SNAPSHOT_SCHEMA_VERSION
    {
        return Err(EtscError::invalid_input(format!(
            "unsupported snapshot schema version {}; supported {}..={}",
            envelope.state_schema_version,
            MIN_SUPPORTED_SNAPSHOT_SCHEMA_VERSION,
            SNAPSHOT_SCHEMA_VERSION
        )));
    }

    let computed = crc32fast::hash(&envelope.payload);
    if computed != envelope.payload_crc32 {
        return Err(EtscError::invalid_input(format!(
            "snapshot payload checksum mismatch: stored={:08x}, computed={computed:08x}",
            envelope.payload_crc32
        )));
    }

    let snapshot: EngineSnapshot = match envelope.payload_codec {
        PayloadCodec::Json => serde_json::from_slice(&envelope.payload).map_err(|err| {
            EtscError::invalid_input(format!("failed to decode snapshot payload: {err}"))
        })?,
        PayloadCodec::Bincode => bincode::deserialize(&envelope.payload).map_err(|err| {
            EtscError::invalid_input(format!("failed to decode snapshot payload: {err}"))
        })?,
    };
    snapshot.head.validate()?;
    Ok(snapshot)
}

/// Writes an envelope to disk as JSON.
pub fn save_snapshot_file(path: &Path, envelope: &SnapshotEnvelope) -> Result<(), EtscError> {
    let encoded = serde_json::to_vec_pretty(envelope).map_err(|err| {
        EtscError::invalid_input(format!("failed to encode snapshot envelope: {err}"))
    })?;
    std::fs::write(path, encoded).map_err(|err| {
        EtscError::invalid_input(format!(
            "failed to write snapshot file {}: {err}",
            path.display()
        ))
    })
}

/// Reads a JSON envelope from disk.
pub fn load_snapshot_file(path: &Path) -> Result<SnapshotEnvelope, EtscError> {
    let raw = std::fs::read(path).map_err(|err| {
        EtscError::invalid_input(format!(
            "failed to read snapshot file {}: {err}",
            path.display()
        ))
    })?;
    serde_json::from_slice(&raw).map_err(|err| {
        EtscError::invalid_input(format!("failed to decode snapshot envelope: {err}"))
    })
}

/// Identifies the engine build that produced a snapshot.
pub fn engine_fingerprint() -> String {
    format!(
        "etsc-engine/{}/{}-{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn now_unix_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

impl<P: StatefulProvider> EarlyClassifier<P> {
    /// Captures the fitted head and provider model.
    pub fn to_snapshot(&self) -> Result<EngineSnapshot, EtscError> {
        let head = self
            .head()
            .cloned()
            .ok_or_else(|| EtscError::unfitted_model("snapshot requires a fitted classifier"))?;
        Ok(EngineSnapshot {
            head,
            provider_payload: self.provider().save_payload()?,
        })
    }

    /// Restores provider model and head from a snapshot.
    pub fn restore_snapshot(&mut self, snapshot: EngineSnapshot) -> Result<(), EtscError> {
        self.provider_mut().load_payload(&snapshot.provider_payload)?;
        self.restore_head(snapshot.head)
    }
}
