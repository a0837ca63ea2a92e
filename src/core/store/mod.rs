// src/core/store/mod.rs

//! The Flag Store (spec §3, §4.2): a keyed map from flag key to versioned
//! flag record, plus a per-key listener registry. A leaf component with no
//! dependency on the lifecycle controller, the workers, or the transport.

pub mod listener;

use crate::core::errors::FlagsError;
use crate::core::flag::{FlagRecord, FlagRecordPayload};
use crate::core::value::{EvaluationReason, FlagValue};
use listener::{Listener, ListenerId, ListenerRegistry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Serialize)]
struct FlagRecordBody<'a> {
    value: &'a FlagValue,
    version: i64,
    #[serde(rename = "variation", skip_serializing_if = "Option::is_none")]
    variation_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a EvaluationReason>,
}

#[derive(Default)]
pub struct FlagStore {
    records: RwLock<HashMap<String, Arc<FlagRecord>>>,
    listeners: ListenerRegistry,
}

impl FlagStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<FlagRecord>> {
        self.records.read().expect("flag store lock poisoned").get(key).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<FlagRecord>> {
        self.records
            .read()
            .expect("flag store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn register_listener(&self, key: &str, listener: Listener) -> ListenerId {
        self.listeners.register(key, listener)
    }

    pub fn unregister_listener(&self, key: &str, id: ListenerId) {
        self.listeners.unregister(key, id);
    }

    /// Atomically replaces the whole store contents (spec §4.2 "put"). The
    /// new map is built unlocked; only the swap itself is under the write
    /// lock, per DESIGN.md's "put atomicity" note, so `get_all` never
    /// observes a partially applied snapshot.
    pub fn put_snapshot(&self, incoming: HashMap<String, FlagRecord>) {
        let new_map: HashMap<String, Arc<FlagRecord>> =
            incoming.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();

        let old_map = {
            let mut guard = self.records.write().expect("flag store lock poisoned");
            std::mem::replace(&mut *guard, new_map.clone())
        };

        let mut changed: Vec<(String, Option<Arc<FlagRecord>>)> = Vec::new();
        for (key, new_rec) in new_map.iter() {
            let differs = match old_map.get(key) {
                Some(old_rec) => **old_rec != **new_rec,
                None => true,
            };
            if differs {
                changed.push((key.clone(), Some(new_rec.clone())));
            }
        }
        for key in old_map.keys() {
            if !new_map.contains_key(key) {
                changed.push((key.clone(), None));
            }
        }

        for (key, record) in changed {
            let is_delete = record.is_none();
            self.dispatch(&key, record, is_delete);
        }
    }

    /// Single-flag upsert (spec §4.2 "patch"). Returns `true` if applied,
    /// `false` if dropped as a stale update.
    pub fn apply_patch(&self, record: FlagRecord) -> bool {
        let key = record.key.clone();
        let arc = {
            let mut guard = self.records.write().expect("flag store lock poisoned");
            if let Some(current) = guard.get(&key) {
                if current.version > record.version {
                    return false;
                }
            }
            let arc = Arc::new(record);
            guard.insert(key.clone(), arc.clone());
            arc
        };
        self.dispatch(&key, Some(arc), false);
        true
    }

    /// Single-flag removal (spec §4.2 "delete"), subject to the same version
    /// check as `apply_patch`. Returns `true` if applied.
    pub fn apply_delete(&self, key: &str, version: i64) -> bool {
        {
            let mut guard = self.records.write().expect("flag store lock poisoned");
            match guard.get(key) {
                Some(current) if current.version > version => return false,
                Some(_) => {
                    guard.remove(key);
                }
                None => return false,
            }
        }
        self.dispatch(key, None, true);
        true
    }

    /// Parses a "put" payload and applies it as a snapshot. Parse failures
    /// are returned to the caller to log and skip (spec §7 ParseFailure);
    /// they never panic or corrupt the existing store.
    pub fn apply_put_text(&self, text: &str) -> Result<(), FlagsError> {
        let payload: HashMap<String, FlagRecordPayload> = serde_json::from_str(text)?;
        let records = payload
            .into_iter()
            .map(|(key, body)| {
                let record = body.into_record(&key);
                (key, record)
            })
            .collect();
        self.put_snapshot(records);
        Ok(())
    }

    pub fn apply_patch_text(&self, text: &str) -> Result<(), FlagsError> {
        let payload: HashMap<String, FlagRecordPayload> = serde_json::from_str(text)?;
        for (key, body) in payload {
            let record = body.into_record(&key);
            self.apply_patch(record);
        }
        Ok(())
    }

    pub fn apply_delete_text(&self, text: &str) -> Result<(), FlagsError> {
        let payload: HashMap<String, FlagRecordPayload> = serde_json::from_str(text)?;
        for (key, body) in payload {
            self.apply_delete(&key, body.version);
        }
        Ok(())
    }

    /// Produces a "put"-equivalent text payload of the current contents
    /// (spec §4.2 "serialize"), used to persist a warm-start snapshot.
    pub fn serialize(&self) -> Result<String, FlagsError> {
        let guard = self.records.read().expect("flag store lock poisoned");
        let map: BTreeMap<&str, FlagRecordBody> = guard
            .iter()
            .map(|(key, record)| {
                (
                    key.as_str(),
                    FlagRecordBody {
                        value: &record.value,
                        version: record.version,
                        variation_index: record.variation_index,
                        reason: record.reason.as_ref(),
                    },
                )
            })
            .collect();
        Ok(serde_json::to_string(&map)?)
    }

    /// Warm-starts the store from a previously `serialize`d payload, defined
    /// as applying it as a "put" (spec §4.2) — so listeners fire for every
    /// restored key, matching `LDClientRestoreFlags` reusing the stream
    /// "put" dispatch path.
    pub fn restore(&self, text: &str) -> Result<(), FlagsError> {
        self.apply_put_text(text)
    }

    fn dispatch(&self, key: &str, record: Option<Arc<FlagRecord>>, is_delete: bool) {
        let listeners = self.listeners.snapshot(key);
        if listeners.is_empty() {
            return;
        }
        for listener in listeners {
            listener(key, record.clone(), is_delete);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn put_then_get_full_snapshot_warm_start() {
        let store = FlagStore::new();
        store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1}}"#)
            .unwrap();
        let rec = store.get("alpha").unwrap();
        assert_eq!(rec.value, serde_json::json!(true));
        assert_eq!(rec.version, 1);
    }

    #[test]
    fn stale_patch_is_dropped() {
        let store = FlagStore::new();
        store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1}}"#)
            .unwrap();
        store
            .apply_patch_text(r#"{"alpha":{"value":false,"version":0}}"#)
            .unwrap();
        let rec = store.get("alpha").unwrap();
        assert_eq!(rec.value, serde_json::json!(true));
        assert_eq!(rec.version, 1);
    }

    #[test]
    fn delete_then_patch() {
        let store = FlagStore::new();
        store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1}}"#)
            .unwrap();
        store.apply_delete_text(r#"{"alpha":{"version":2}}"#).unwrap();
        assert!(store.get("alpha").is_none());
        store
            .apply_patch_text(r#"{"alpha":{"value":true,"version":3}}"#)
            .unwrap();
        let rec = store.get("alpha").unwrap();
        assert_eq!(rec.value, serde_json::json!(true));
        assert_eq!(rec.version, 3);
    }

    #[test]
    fn double_apply_of_same_patch_is_idempotent() {
        let store = FlagStore::new();
        let patch = r#"{"alpha":{"value":true,"version":5}}"#;
        store.apply_patch_text(patch).unwrap();
        let first = store.get("alpha").unwrap();
        store.apply_patch_text(patch).unwrap();
        let second = store.get("alpha").unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn restore_of_serialize_round_trips() {
        let store = FlagStore::new();
        store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1},"beta":{"value":"s","version":2}}"#)
            .unwrap();
        let text = store.serialize().unwrap();

        let restored = FlagStore::new();
        restored.restore(&text).unwrap();
        assert_eq!(restored.get("alpha").unwrap().value, store.get("alpha").unwrap().value);
        assert_eq!(restored.get("beta").unwrap().version, store.get("beta").unwrap().version);
    }

    #[test]
    fn listener_fires_exactly_once_per_committed_change_and_not_under_lock() {
        let store = FlagStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let id = store.register_listener(
            "alpha",
            Arc::new(move |_key, record, is_delete| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                assert!(!is_delete);
                assert!(record.is_some());
            }),
        );
        store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1}}"#)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        store.unregister_listener("alpha", id);
        store
            .apply_patch_text(r#"{"alpha":{"value":false,"version":2}}"#)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_reenter_store_without_deadlock() {
        let store = Arc::new(FlagStore::new());
        let inner = store.clone();
        store.register_listener(
            "alpha",
            Arc::new(move |_key, _record, _is_delete| {
                // Reentrant read must not deadlock: no store lock is held
                // while this closure runs.
                let _ = inner.get("alpha");
                let _ = inner.get_all();
            }),
        );
        store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1}}"#)
            .unwrap();
    }
}
