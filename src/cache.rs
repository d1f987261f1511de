//! In-process caches for actor documents and webfinger records
//!
//! Both caches are plain maps behind a mutex. Critical sections cover map
//! operations only; callers never hold a lock across network I/O. Two
//! concurrent resolutions of the same handle may both fetch and both store,
//! last writer wins.

use crate::storage;
use crate::webfinger::JrdResource;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Entries older than this many whole days are removed by the sweep
pub const ACTOR_RETENTION_DAYS: i64 = 2;

/// A cached actor document
#[derive(Debug, Clone, PartialEq)]
pub struct ActorCacheEntry {
    pub actor: Value,
    /// Last time the entry was stored or read
    pub timestamp: DateTime<Utc>,
}

/// Actor URL -> actor document, with optional seed files on disk
#[derive(Debug, Default)]
pub struct ActorCache {
    entries: Mutex<HashMap<String, ActorCacheEntry>>,
    seed_dir: Option<PathBuf>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Actor URL without any `#fragment`
fn strip_fragment(actor_url: &str) -> &str {
    actor_url.split('#').next().unwrap_or(actor_url)
}

impl ActorCache {
    /// Memory-only cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose first store of each actor is mirrored to `seed_dir`
    pub fn with_seed_dir(seed_dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            seed_dir: Some(seed_dir.into()),
        }
    }

    pub fn seed_dir(&self) -> Option<&Path> {
        self.seed_dir.as_deref()
    }

    /// Seed file path: the URL with `/` replaced by `#`
    pub fn seed_path(&self, actor_url: &str) -> Option<PathBuf> {
        let dir = self.seed_dir.as_ref()?;
        let escaped = strip_fragment(actor_url).replace('/', "#");
        Some(dir.join(format!("{}.json", escaped)))
    }

    /// Store an actor, seeding the disk copy if none exists yet
    pub fn store(&self, actor_url: &str, actor: Value) {
        self.store_with(actor_url, actor, true);
    }

    /// Store an actor. With `allow_write_to_file` false only memory is touched.
    pub fn store_with(&self, actor_url: &str, actor: Value, allow_write_to_file: bool) {
        let actor_url = strip_fragment(actor_url);

        if allow_write_to_file && let Some(path) = self.seed_path(actor_url) {
            match storage::save_json_if_absent(&path, &actor) {
                Ok(true) => debug!("Seeded actor cache file {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to seed actor cache for {}: {}", actor_url, e),
            }
        }

        lock(&self.entries).insert(
            actor_url.to_string(),
            ActorCacheEntry {
                actor,
                timestamp: Utc::now(),
            },
        );
    }

    /// Fetch an actor from memory, falling back to its seed file
    pub fn get(&self, actor_url: &str) -> Option<Value> {
        let actor_url = strip_fragment(actor_url);

        {
            let mut entries = lock(&self.entries);
            if let Some(entry) = entries.get_mut(actor_url) {
                entry.timestamp = Utc::now();
                return Some(entry.actor.clone());
            }
        }

        let path = storage::find_case_insensitive(&self.seed_path(actor_url)?)?;
        match storage::load_json::<Value>(&path) {
            Ok(Some(actor)) => {
                debug!("Loaded actor {} from {}", actor_url, path.display());
                Some(self.insert_if_absent(actor_url, actor))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Unreadable actor cache file for {}: {}", actor_url, e);
                None
            }
        }
    }

    /// Insert a cold-loaded actor unless a store raced ahead of the disk
    /// read. Returns whichever document ends up cached.
    fn insert_if_absent(&self, actor_url: &str, actor: Value) -> Value {
        let mut entries = lock(&self.entries);
        let entry = entries
            .entry(actor_url.to_string())
            .or_insert_with(|| ActorCacheEntry {
                actor,
                timestamp: Utc::now(),
            });
        entry.actor.clone()
    }

    /// Current entry, without refreshing its timestamp
    pub fn entry(&self, actor_url: &str) -> Option<ActorCacheEntry> {
        lock(&self.entries).get(strip_fragment(actor_url)).cloned()
    }

    /// Drop an actor from memory and delete its seed file
    pub fn remove(&self, actor_url: &str) -> bool {
        let actor_url = strip_fragment(actor_url);
        let removed = lock(&self.entries).remove(actor_url).is_some();
        if let Some(path) = self.seed_path(actor_url) {
            match storage::remove_file(&path) {
                Ok(_) => {}
                Err(e) => warn!("Failed to remove actor cache file for {}: {}", actor_url, e),
            }
        }
        removed
    }

    /// Remove entries not accessed within the retention window
    pub fn expire(&self) -> usize {
        self.expire_at(Utc::now())
    }

    /// Sweep relative to `now`. The lock is held for the whole pass.
    pub fn expire_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| (now - entry.timestamp).num_days() <= ACTOR_RETENTION_DAYS);
        let removed = before - entries.len();
        info!("{} actors were expired from the cache", removed);
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Forget everything held in memory. Seed files are kept.
    pub fn clear_memory(&self) {
        lock(&self.entries).clear();
    }

    #[cfg(test)]
    fn backdate(&self, actor_url: &str, timestamp: DateTime<Utc>) {
        if let Some(entry) = lock(&self.entries).get_mut(actor_url) {
            entry.timestamp = timestamp;
        }
    }
}

/// Handle (`nick@domain`) -> webfinger document
#[derive(Debug, Default)]
pub struct WebfingerCache {
    entries: Mutex<HashMap<String, JrdResource>>,
}

impl WebfingerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, handle: &str, document: JrdResource) {
        lock(&self.entries).insert(handle.to_string(), document);
    }

    pub fn get(&self, handle: &str) -> Option<JrdResource> {
        lock(&self.entries).get(handle).cloned()
    }

    pub fn remove(&self, handle: &str) -> Option<JrdResource> {
        lock(&self.entries).remove(handle)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

/// The caches shared by the resolver, endpoint store and synchronizer
#[derive(Debug, Default)]
pub struct Caches {
    pub actors: ActorCache,
    pub webfingers: WebfingerCache,
}

impl Caches {
    pub fn new(actors: ActorCache) -> Self {
        Self {
            actors,
            webfingers: WebfingerCache::new(),
        }
    }

    /// Caches seeded from `<base_dir>/cache/actors`
    pub fn with_base_dir(base_dir: &Path) -> Self {
        Self::new(ActorCache::with_seed_dir(base_dir.join("cache").join("actors")))
    }
}
