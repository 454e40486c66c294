//! Namespaced, bounded webhook log.
//!
//! Each namespace owns its own mutex so writers to different namespaces do
//! not serialize against each other. The namespace map itself is behind a
//! read/write lock that is only taken for writing when a namespace is
//! created or the whole store is reset. Inserts hold the map read lock for
//! their whole duration, so a full reset can never race with an insert into
//! a log that is being dropped.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::record::{Headers, WebhookRecord};
use crate::snapshot::Snapshot;

/// Default number of records kept per namespace.
pub const MAX_ENTRIES: usize = 100;

/// Namespace that receives un-namespaced and legacy data.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug)]
struct LogEntry {
    /// Store-wide insertion order. Records loaded from a snapshot use 0.
    sequence: u64,
    record: WebhookRecord,
}

/// Newest-first records of one namespace.
#[derive(Debug, Default)]
struct NamespaceLog {
    entries: VecDeque<LogEntry>,
}

impl NamespaceLog {
    fn from_records(records: Vec<WebhookRecord>, capacity: usize) -> Self {
        let entries = records
            .into_iter()
            .take(capacity)
            .map(|record| LogEntry {
                sequence: 0,
                record,
            })
            .collect();
        Self { entries }
    }

    fn push_front_bounded(&mut self, entry: LogEntry, capacity: usize) -> usize {
        self.entries.push_front(entry);
        let before = self.entries.len();
        self.entries.truncate(capacity);
        before - self.entries.len()
    }

    fn to_vec(&self) -> Vec<WebhookRecord> {
        self.entries.iter().map(|entry| entry.record.clone()).collect()
    }
}

/// In-memory webhook store keyed by namespace.
#[derive(Debug)]
pub struct EntryStore {
    capacity: usize,
    next_sequence: AtomicU64,
    namespaces: RwLock<BTreeMap<String, Mutex<NamespaceLog>>>,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(MAX_ENTRIES)
    }
}

impl EntryStore {
    /// Create an empty store keeping at most `capacity` records per namespace.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_sequence: AtomicU64::new(1),
            namespaces: RwLock::new(BTreeMap::new()),
        }
    }

    /// Hydrate a store from a snapshot, truncating over-long logs.
    pub fn from_snapshot(snapshot: Snapshot, capacity: usize) -> Self {
        let store = Self::new(capacity);
        {
            let mut namespaces = store.namespaces.write();
            for (namespace, records) in snapshot {
                namespaces.insert(
                    namespace,
                    Mutex::new(NamespaceLog::from_records(records, store.capacity)),
                );
            }
        }
        store
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a new webhook call in `namespace` and return the stored record.
    pub fn record(
        &self,
        namespace: &str,
        payload: Value,
        headers: Headers,
        method: &str,
        request_path: &str,
    ) -> WebhookRecord {
        self.insert(
            namespace,
            WebhookRecord::new(payload, headers, method, request_path),
        )
    }

    /// Insert an already built record at the front of `namespace`.
    pub fn insert(&self, namespace: &str, record: WebhookRecord) -> WebhookRecord {
        let capacity = self.capacity;
        let stored = record.clone();
        let evicted = self.with_log(namespace, |log| {
            // Taken under the namespace lock so it agrees with log order.
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            log.push_front_bounded(LogEntry { sequence, record }, capacity)
        });
        if evicted > 0 {
            debug!(namespace = %namespace, evicted, "Evicted oldest webhook records");
        }
        stored
    }

    /// Records of `namespace`, newest first.
    ///
    /// Reading an unknown namespace creates it empty.
    pub fn list(&self, namespace: &str) -> Vec<WebhookRecord> {
        self.with_log(namespace, |log| log.to_vec())
    }

    /// Every record paired with its namespace, newest first.
    ///
    /// Equal timestamps fall back to insertion order, newest first. Records
    /// loaded from a snapshot keep namespace order, then log order.
    pub fn list_all(&self) -> Vec<(String, WebhookRecord)> {
        let namespaces = self.namespaces.read();
        let mut all: Vec<(u64, String, WebhookRecord)> = namespaces
            .iter()
            .flat_map(|(namespace, log)| {
                log.lock()
                    .entries
                    .iter()
                    .map(|entry| (entry.sequence, namespace.clone(), entry.record.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| {
            b.2.received_at()
                .cmp(&a.2.received_at())
                .then(b.0.cmp(&a.0))
        });
        all.into_iter()
            .map(|(_, namespace, record)| (namespace, record))
            .collect()
    }

    /// Empty one namespace, or remove every namespace when `None`.
    pub fn clear(&self, namespace: Option<&str>) {
        match namespace {
            Some(namespace) => {
                let namespaces = self.namespaces.read();
                if let Some(log) = namespaces.get(namespace) {
                    log.lock().entries.clear();
                }
            }
            None => self.namespaces.write().clear(),
        }
    }

    /// Record count of one namespace, or of the whole store when `None`.
    pub fn count(&self, namespace: Option<&str>) -> usize {
        let namespaces = self.namespaces.read();
        match namespace {
            Some(namespace) => namespaces
                .get(namespace)
                .map(|log| log.lock().entries.len())
                .unwrap_or(0),
            None => namespaces.values().map(|log| log.lock().entries.len()).sum(),
        }
    }

    /// All namespace names known to the store.
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.namespaces.read().keys().cloned().collect()
    }

    /// Copy of the whole store for persistence.
    pub fn snapshot(&self) -> Snapshot {
        self.namespaces
            .read()
            .iter()
            .map(|(namespace, log)| (namespace.clone(), log.lock().to_vec()))
            .collect()
    }

    fn with_log<R>(&self, namespace: &str, f: impl FnOnce(&mut NamespaceLog) -> R) -> R {
        {
            let namespaces = self.namespaces.read();
            if let Some(log) = namespaces.get(namespace) {
                return f(&mut log.lock());
            }
        }

        let mut namespaces = self.namespaces.write();
        let log = namespaces.entry(namespace.to_string()).or_default();
        f(log.get_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn record_payload(store: &EntryStore, namespace: &str, payload: Value) -> WebhookRecord {
        store.record(namespace, payload, Headers::new(), "POST", "/webhook")
    }

    #[test]
    fn test_record_returns_stored_record() {
        let store = EntryStore::default();
        let record = record_payload(&store, "x", json!({"a": 1}));

        let listed = store.list("x");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], record);
        assert_eq!(listed[0].payload(), &json!({"a": 1}));
    }

    #[test]
    fn test_newest_first_ordering() {
        let store = EntryStore::default();
        record_payload(&store, "x", json!({"n": 1}));
        record_payload(&store, "x", json!({"n": 2}));
        record_payload(&store, "x", json!({"n": 3}));

        let payloads: Vec<Value> = store.list("x").iter().map(|r| r.payload().clone()).collect();
        assert_eq!(payloads, vec![json!({"n": 3}), json!({"n": 2}), json!({"n": 1})]);
    }

    #[test]
    fn test_capacity_keeps_most_recent_records() {
        let store = EntryStore::default();
        for n in 1..=150 {
            record_payload(&store, "z", json!({ "n": n }));
        }

        let records = store.list("z");
        assert_eq!(records.len(), MAX_ENTRIES);
        assert_eq!(records[0].payload(), &json!({"n": 150}));
        assert_eq!(records[MAX_ENTRIES - 1].payload(), &json!({"n": 51}));
    }

    #[test]
    fn test_custom_capacity() {
        let store = EntryStore::new(3);
        for n in 1..=5 {
            record_payload(&store, "small", json!({ "n": n }));
        }
        let records = store.list("small");
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].payload(), &json!({"n": 3}));
        assert_eq!(EntryStore::new(0).capacity(), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = EntryStore::default();
        record_payload(&store, "a", json!({"ns": "a"}));
        let before = store.list("b");

        record_payload(&store, "a", json!({"ns": "a2"}));

        assert_eq!(store.list("b"), before);
        assert_eq!(store.count(Some("b")), 0);
        assert_eq!(store.count(Some("a")), 2);
    }

    #[test]
    fn test_list_creates_namespace_but_count_does_not() {
        let store = EntryStore::default();
        assert!(store.list("fresh").is_empty());
        assert!(store.namespaces().contains("fresh"));

        assert_eq!(store.count(Some("unseen")), 0);
        assert!(!store.namespaces().contains("unseen"));
    }

    #[test]
    fn test_clear_single_namespace() {
        let store = EntryStore::default();
        record_payload(&store, "a", json!({"a": 1}));
        record_payload(&store, "b", json!({"b": 1}));
        record_payload(&store, "b", json!({"b": 2}));

        store.clear(Some("a"));

        assert_eq!(store.count(Some("a")), 0);
        assert_eq!(store.count(Some("b")), 2);
        assert!(store.namespaces().contains("a"));
    }

    #[test]
    fn test_clear_all() {
        let store = EntryStore::default();
        record_payload(&store, "a", json!({"a": 1}));
        record_payload(&store, "b", json!({"b": 1}));

        store.clear(None);

        assert_eq!(store.count(None), 0);
        assert!(store.namespaces().is_empty());
    }

    #[test]
    fn test_count_sums_namespaces() {
        let store = EntryStore::default();
        record_payload(&store, "a", json!({"a": 1}));
        record_payload(&store, "b", json!({"b": 1}));
        record_payload(&store, "b", json!({"b": 2}));
        assert_eq!(store.count(None), 3);
    }

    #[test]
    fn test_list_all_sorted_by_timestamp_descending() {
        let store = EntryStore::default();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let plan = [("a", 0), ("b", 3), ("a", 1), ("c", 5), ("b", 2), ("c", 4)];
        for (namespace, offset) in plan {
            let record = WebhookRecord::new_at(
                base + Duration::seconds(offset),
                json!({ "offset": offset }),
                Headers::new(),
                "POST",
                "/",
            );
            store.insert(namespace, record);
        }

        let all = store.list_all();
        let offsets: Vec<i64> = all
            .iter()
            .map(|(_, r)| r.payload()["offset"].as_i64().unwrap())
            .collect();
        assert_eq!(offsets, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(all[0].0, "c");
        assert_eq!(all[5].0, "a");
        for pair in all.windows(2) {
            assert!(pair[0].1.received_at() > pair[1].1.received_at());
        }
    }

    #[test]
    fn test_list_all_ties_follow_insertion_order() {
        let store = EntryStore::default();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (namespace, n) in [("zeta", 1), ("alpha", 2), ("zeta", 3), ("mid", 4)] {
            store.insert(
                namespace,
                WebhookRecord::new_at(at, json!({ "n": n }), Headers::new(), "POST", "/"),
            );
        }

        let order: Vec<i64> = store
            .list_all()
            .into_iter()
            .map(|(_, r)| r.payload()["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_loaded_ties_keep_namespace_then_log_order() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let tied =
            |n: i64| WebhookRecord::new_at(at, json!({ "n": n }), Headers::new(), "POST", "/");
        let mut snapshot = Snapshot::new();
        snapshot.insert("b".to_string(), vec![tied(1)]);
        snapshot.insert("a".to_string(), vec![tied(3), tied(2)]);
        let store = EntryStore::from_snapshot(snapshot, MAX_ENTRIES);

        let order: Vec<(String, i64)> = store
            .list_all()
            .into_iter()
            .map(|(ns, r)| (ns, r.payload()["n"].as_i64().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![("a".to_string(), 3), ("a".to_string(), 2), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn test_snapshot_and_hydrate() {
        let store = EntryStore::default();
        record_payload(&store, "a", json!({"n": 1}));
        record_payload(&store, "a", json!({"n": 2}));
        record_payload(&store, "b", json!({"n": 3}));
        store.list("empty");

        let restored = EntryStore::from_snapshot(store.snapshot(), MAX_ENTRIES);

        assert_eq!(restored.namespaces(), store.namespaces());
        assert_eq!(restored.list("a"), store.list("a"));
        assert_eq!(restored.list("b"), store.list("b"));
        assert!(restored.list("empty").is_empty());
    }

    #[test]
    fn test_hydrate_truncates_to_capacity() {
        let store = EntryStore::new(10);
        for n in 0..10 {
            record_payload(&store, "a", json!({ "n": n }));
        }

        let restored = EntryStore::from_snapshot(store.snapshot(), 4);
        let records = restored.list("a");
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].payload(), &json!({"n": 9}));
    }

    #[test]
    fn test_concurrent_writes_respect_capacity() {
        let store = Arc::new(EntryStore::new(50));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        let namespace = if n % 2 == 0 { "shared" } else { "other" };
                        record_payload(&store, namespace, json!({ "worker": worker, "n": n }));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count(Some("shared")), 50);
        assert_eq!(store.count(Some("other")), 50);

        let ids: BTreeSet<String> = store
            .list("shared")
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids.len(), 50);
    }
}
