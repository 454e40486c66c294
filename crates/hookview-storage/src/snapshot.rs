//! Snapshot codec.
//!
//! A snapshot file is a JSON object mapping namespace names to newest-first
//! record arrays. Files written before namespaces existed hold a bare array
//! of records; those load as the single namespace `"default"`.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::entry_store::DEFAULT_NAMESPACE;
use crate::error::{Result, StorageError};
use crate::record::WebhookRecord;

/// Full store contents: namespace to newest-first records.
pub type Snapshot = BTreeMap<String, Vec<WebhookRecord>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFormat {
    Namespaced(Snapshot),
    Legacy(Vec<WebhookRecord>),
}

/// Serialize a snapshot as pretty-printed JSON.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot).map_err(StorageError::Encode)
}

/// Parse snapshot bytes, accepting both the namespaced and legacy layouts.
///
/// Empty or whitespace-only input is an empty snapshot.
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::new());
    }

    match serde_json::from_slice(bytes).map_err(StorageError::Decode)? {
        SnapshotFormat::Namespaced(snapshot) => Ok(snapshot),
        SnapshotFormat::Legacy(records) => {
            let mut snapshot = Snapshot::new();
            snapshot.insert(DEFAULT_NAMESPACE.to_string(), records);
            Ok(snapshot)
        }
    }
}
