//! `ImageEntry` and the in-memory LRU cache backing the ImageStore
//! (spec §3 ImageEntry, §4.1 Eviction policy).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub base64_thumbnail: String,
    pub captured_at: DateTime<Utc>,
    pub persisted: bool,
}

/// Strict LRU with disk-persisted entries preferred for eviction under
/// pressure (spec §4.1). Recency is tracked with an explicit order
/// list rather than an intrusive linked structure, since the ImageStore
/// already serializes all access behind one mutex (spec §5).
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, ImageEntry>,
    /// Least- to most-recently-used.
    order: VecDeque<String>,
}

impl MemoryCache {
    pub fn get(&mut self, hash: &str) -> Option<&ImageEntry> {
        if self.entries.contains_key(hash) {
            self.touch(hash);
        }
        self.entries.get(hash)
    }

    pub fn peek(&self, hash: &str) -> Option<&ImageEntry> {
        self.entries.get(hash)
    }

    pub fn peek_mut(&mut self, hash: &str) -> Option<&mut ImageEntry> {
        self.entries.get_mut(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn insert(&mut self, hash: String, entry: ImageEntry) {
        if self.entries.insert(hash.clone(), entry).is_some() {
            self.order.retain(|k| k != &hash);
        }
        self.order.push_back(hash);
    }

    pub fn remove(&mut self, hash: &str) -> Option<ImageEntry> {
        self.order.retain(|k| k != hash);
        self.entries.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, hash: &str) {
        self.order.retain(|k| k != hash);
        self.order.push_back(hash.to_string());
    }

    /// Removes the oldest entry, preferring an already-persisted one
    /// over a memory-only one so irreplaceable data survives pressure.
    pub fn evict_one(&mut self) -> Option<String> {
        let victim = self
            .order
            .iter()
            .find(|k| self.entries.get(*k).is_some_and(|e| e.persisted))
            .cloned()
            .or_else(|| self.order.front().cloned())?;
        self.remove(&victim);
        Some(victim)
    }

    /// Hashes whose entries predate `cutoff` and are memory-only (spec
    /// §4.1: TTL only evicts memory-only entries).
    pub fn expired_memory_only(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.persisted && e.captured_at < cutoff)
            .map(|(k, _)| k.clone())
            .collect()
    }
}
