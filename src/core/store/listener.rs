// src/core/store/listener.rs

//! Listener identity and the per-key listener registry (spec §4.2, §9
//! "Listener equality"). Rust closures have no stable pointer identity to
//! key off, so `register_listener` returns an opaque `ListenerId` token and
//! `unregister_listener` takes that token back — the token strategy spec §9
//! explicitly sanctions as an alternative to function-pointer identity.

use crate::core::flag::FlagRecord;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Invoked with the flag key, the new record (`None` on delete), and whether
/// this invocation is a delete. Never called while any store lock is held.
pub type Listener = Arc<dyn Fn(&str, Option<Arc<FlagRecord>>, bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    by_key: DashMap<String, Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, key: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_key
            .entry(key.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    pub fn unregister(&self, key: &str, id: ListenerId) {
        if let Some(mut entry) = self.by_key.get_mut(key) {
            entry.retain(|(existing, _)| *existing != id);
        }
    }

    /// Returns a snapshot clone of the listeners registered for `key`, so the
    /// caller can invoke them with no registry entry lock held: tolerates a
    /// listener that registers or unregisters listeners for other keys, or
    /// for this same key, mid-dispatch.
    pub fn snapshot(&self, key: &str) -> Vec<Listener> {
        self.by_key
            .get(key)
            .map(|entry| entry.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default()
    }
}
