//! Hookview Storage - namespaced webhook log
//!
//! This crate owns every piece of state the webhook inspector keeps: the
//! bounded per-namespace record log and its best-effort JSON snapshot.
//!
//! # Architecture
//!
//! - [`EntryStore`] keeps the newest [`MAX_ENTRIES`] records of each
//!   namespace in memory and is the only thing that mutates them.
//! - [`snapshot`] encodes the whole store as `{namespace: [record, ...]}` and
//!   still reads the older flat-array layout.
//! - [`SnapshotBackend`] implementations move snapshot bytes to a file
//!   ([`JsonFileBackend`]) or keep them in memory ([`MemoryBackend`]).
//! - [`SnapshotWriter`] runs saves on a background task and reports every
//!   outcome on a broadcast channel.

pub mod backend;
pub mod entry_store;
pub mod error;
pub mod persistence;
pub mod record;
pub mod snapshot;

mod time_utils;

pub use backend::{JsonFileBackend, MemoryBackend, SnapshotBackend};
pub use entry_store::{DEFAULT_NAMESPACE, EntryStore, MAX_ENTRIES};
pub use error::StorageError;
pub use persistence::{SaveOutcome, SnapshotWriter, load_snapshot, save_snapshot};
pub use record::{HeaderValue, Headers, WebhookRecord};
pub use snapshot::Snapshot;
