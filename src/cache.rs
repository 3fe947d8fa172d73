//! Read-through response cache.
//!
//! Serialized JSON responses are cached per `(library, request path)` and
//! served verbatim on later GETs. Mutations invalidate entries explicitly:
//! every handler that changes data names the cache paths it makes stale.
//! A typed side of the cache holds structured records (the library record of
//! an identity) as JSON under a separate key space.

use crate::error::PlannerResult;
use crate::store::key::Key;
use axum::body::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const TYPED_PREFIX: &str = "typed:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<String, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key of a response for `path` within `library`.
    pub fn response_key(library: &Key, path: &str) -> String {
        format!("{}|{}", library.encode(), path)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: String, value: Bytes) {
        self.entries.insert(key, value);
    }

    pub fn delete(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!("cache invalidated {key}");
        }
    }

    /// Drops every entry whose key starts with `prefix`.
    pub fn delete_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(&format!("{TYPED_PREFIX}{key}"))?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> PlannerResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(format!("{TYPED_PREFIX}{key}"), Bytes::from(bytes));
        Ok(())
    }

    pub fn delete_typed(&self, key: &str) {
        self.delete(&format!("{TYPED_PREFIX}{key}"));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// View of the response cache scoped to one library.
pub struct LibraryCache<'a> {
    cache: &'a ResponseCache,
    library: &'a Key,
}

impl<'a> LibraryCache<'a> {
    pub fn new(cache: &'a ResponseCache, library: &'a Key) -> Self {
        LibraryCache { cache, library }
    }

    fn key(&self, path: &str) -> String {
        ResponseCache::response_key(self.library, path)
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.cache.get(&self.key(path))
    }

    pub fn set(&self, path: &str, value: Bytes) {
        self.cache.set(self.key(path), value);
    }

    pub fn delete(&self, path: &str) {
        self.cache.delete(&self.key(path));
    }

    /// Invalidates a collection path both with and without its trailing slash.
    pub fn delete_collection(&self, path: &str) {
        let bare = path.trim_end_matches('/');
        self.delete(bare);
        self.delete(&format!("{bare}/"));
    }

    /// Invalidates `path` and every path below it.
    pub fn delete_tree(&self, path: &str) {
        let bare = path.trim_end_matches('/');
        self.delete(bare);
        self.cache.delete_prefix(&format!("{}/", self.key(bare)));
    }

    /// Invalidates everything cached for the library.
    pub fn clear(&self) {
        self.cache.delete_prefix(&format!("{}|", self.library.encode()));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.cache.contains(&self.key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::key::Kind;

    #[test]
    fn collection_invalidation_covers_both_spellings() {
        let cache = ResponseCache::new();
        let lib = Key::new(Kind::Library, 1, None);
        let scoped = LibraryCache::new(&cache, &lib);

        scoped.set("/dish", Bytes::from_static(b"[]"));
        scoped.set("/dish/", Bytes::from_static(b"[]"));
        scoped.delete_collection("/dish/");

        assert!(!scoped.contains("/dish"));
        assert!(!scoped.contains("/dish/"));
    }

    #[test]
    fn tree_invalidation_spares_siblings() {
        let cache = ResponseCache::new();
        let lib = Key::new(Kind::Library, 1, None);
        let scoped = LibraryCache::new(&cache, &lib);

        for path in ["/dish/A", "/dish/A/tags/", "/dish/A/tags/T", "/dish/AB", "/dish/"] {
            scoped.set(path, Bytes::from_static(b"{}"));
        }
        scoped.delete_tree("/dish/A");

        assert!(!scoped.contains("/dish/A"));
        assert!(!scoped.contains("/dish/A/tags/"));
        assert!(!scoped.contains("/dish/A/tags/T"));
        assert!(scoped.contains("/dish/AB"));
        assert!(scoped.contains("/dish/"));
    }

    #[test]
    fn libraries_do_not_share_entries() {
        let cache = ResponseCache::new();
        let a = Key::new(Kind::Library, 1, None);
        let b = Key::new(Kind::Library, 2, None);

        LibraryCache::new(&cache, &a).set("/menu/", Bytes::from_static(b"[1]"));
        assert!(LibraryCache::new(&cache, &b).get("/menu/").is_none());

        LibraryCache::new(&cache, &a).clear();
        assert!(LibraryCache::new(&cache, &a).get("/menu/").is_none());
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[test]
    fn typed_values_round_trip() {
        let cache = ResponseCache::new();
        cache.set_typed("owner:a", &vec![1, 2, 3]).unwrap();
        assert_eq!(cache.get_typed::<Vec<i32>>("owner:a"), Some(vec![1, 2, 3]));
        cache.delete_typed("owner:a");
        assert_eq!(cache.get_typed::<Vec<i32>>("owner:a"), None);
    }
}
