//! Key-value store abstraction backing the tracking registry.
//!
//! The registry only needs string sets and hash maps plus atomic multi-key
//! batches, so the backend is kept behind the `Store` trait. The shipped
//! `MemoryStore` guards everything with one mutex, which makes a batch
//! naturally all-or-nothing as observed by other callers. A network-attached
//! backend would map `StoreOp` onto its native pipeline facility.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Key shapes used by the tracking registry.
///
/// A tracking record for (player, handle) is the triple: membership in the
/// global set, membership in the per-player set, and the metadata hash.
/// The three are only ever mutated together.
pub mod keys {
    /// Global set of every tracked `"{player}_{handle}"` pair.
    pub const GLOBAL_SET: &str = "entities";

    /// Per-player set of tracked entity handles.
    pub fn player_set(player_id: u32) -> String {
        format!("entities_{}", player_id)
    }

    /// Composite member stored in the global set.
    pub fn composite(player_id: u32, handle: u32) -> String {
        format!("{}_{}", player_id, handle)
    }

    /// Metadata hash for one (player, entity) pair.
    pub fn meta(player_id: u32, handle: u32) -> String {
        format!("meta_{}_{}", player_id, handle)
    }
}

/// One store mutation. Batches of these are applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    SAdd { set: String, member: String },
    SRem { set: String, member: String },
    HSet { hash: String, field: String, value: String },
    HDel { hash: String, field: String },
    Del { key: String },
}

/// Minimal key-value backend contract: sets, hashes, and atomic batches.
pub trait Store: Send + Sync {
    /// Reads one hash field.
    fn hget(&self, hash: &str, field: &str) -> Option<String>;

    /// Reads a whole hash. Empty map if the hash does not exist.
    fn hgetall(&self, hash: &str) -> HashMap<String, String>;

    /// Returns true if `key` exists as a hash or a set.
    fn exists(&self, key: &str) -> bool;

    /// Members of a set, sorted. Empty if the set does not exist.
    fn smembers(&self, set: &str) -> Vec<String>;

    /// Applies every operation in order as a single atomic unit.
    fn apply(&self, batch: &[StoreOp]);

    /// Drops all data. Called once at server startup.
    fn flush(&self);

    fn hset(&self, hash: &str, field: &str, value: &str) {
        self.apply(&[StoreOp::HSet {
            hash: hash.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }]);
    }

    fn hdel(&self, hash: &str, field: &str) {
        self.apply(&[StoreOp::HDel {
            hash: hash.to_string(),
            field: field.to_string(),
        }]);
    }
}

#[derive(Default)]
struct StoreInner {
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl StoreInner {
    fn apply_op(&mut self, op: &StoreOp) {
        match op {
            StoreOp::SAdd { set, member } => {
                self.sets.entry(set.clone()).or_default().insert(member.clone());
            }
            StoreOp::SRem { set, member } => {
                if let Some(members) = self.sets.get_mut(set) {
                    members.remove(member);
                    if members.is_empty() {
                        self.sets.remove(set);
                    }
                }
            }
            StoreOp::HSet { hash, field, value } => {
                self.hashes
                    .entry(hash.clone())
                    .or_default()
                    .insert(field.clone(), value.clone());
            }
            StoreOp::HDel { hash, field } => {
                if let Some(fields) = self.hashes.get_mut(hash) {
                    fields.remove(field);
                }
            }
            StoreOp::Del { key } => {
                self.sets.remove(key);
                self.hashes.remove(key);
            }
        }
    }
}

/// In-process store implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn hget(&self, hash: &str, field: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.hashes.get(hash).and_then(|fields| fields.get(field).cloned())
    }

    fn hgetall(&self, hash: &str) -> HashMap<String, String> {
        let inner = self.inner.lock().unwrap();
        inner.hashes.get(hash).cloned().unwrap_or_default()
    }

    fn exists(&self, key: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.hashes.contains_key(key) || inner.sets.contains_key(key)
    }

    fn smembers(&self, set: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut members: Vec<String> = inner
            .sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    fn apply(&self, batch: &[StoreOp]) {
        // One lock acquisition for the whole batch; no caller can observe
        // a partially applied sequence.
        let mut inner = self.inner.lock().unwrap();
        for op in batch {
            inner.apply_op(op);
        }
    }

    fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.sets.clear();
        inner.hashes.clear();
    }
}
