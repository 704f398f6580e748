//! Language Preference Store: current language plus the text → language →
//! translation cache, both persisted through a `Persister`.
//!
//! Cached pairs are never invalidated. Every cache mutation re-serializes and
//! persists the whole blob; cost grows linearly with the cache size.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::language::LanguageCode;
use crate::storage::Persister;

pub const DEFAULT_LANGUAGE_KEY: &str = "preferred_language";
pub const DEFAULT_CACHE_KEY: &str = "translation_cache";

type Translations = HashMap<LanguageCode, String>;

/// Cache table. Unbounded by default; the LRU variant caps distinct source texts.
enum CacheTable {
    Unbounded(HashMap<String, Translations>),
    Bounded(LruCache<String, Translations>),
}

impl CacheTable {
    fn new(capacity: Option<usize>) -> Self {
        match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => CacheTable::Bounded(LruCache::new(cap)),
            None => CacheTable::Unbounded(HashMap::new()),
        }
    }

    fn get(&mut self, text: &str) -> Option<&Translations> {
        match self {
            CacheTable::Unbounded(map) => map.get(text),
            CacheTable::Bounded(lru) => lru.get(text),
        }
    }

    fn entry(&mut self, text: &str) -> &mut Translations {
        match self {
            CacheTable::Unbounded(map) => map.entry(text.to_string()).or_default(),
            CacheTable::Bounded(lru) => lru.get_or_insert_mut(text.to_string(), HashMap::new),
        }
    }

    fn len(&self) -> usize {
        match self {
            CacheTable::Unbounded(map) => map.len(),
            CacheTable::Bounded(lru) => lru.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            CacheTable::Unbounded(map) => map.clear(),
            CacheTable::Bounded(lru) => lru.clear(),
        }
    }

    /// Snapshot in a form serde can write. LRU entries go oldest first so a
    /// reload replays them in recency order.
    fn snapshot(&self) -> Vec<(&String, &Translations)> {
        match self {
            CacheTable::Unbounded(map) => map.iter().collect(),
            CacheTable::Bounded(lru) => lru.iter().rev().collect(),
        }
    }

    fn load(&mut self, blob: Vec<(String, Translations)>) {
        for (text, translations) in blob {
            self.entry(&text).extend(translations);
        }
    }
}

pub struct LanguageStore {
    persister: Persister,
    language_key: String,
    cache_key: String,
    current: RwLock<LanguageCode>,
    cache: Mutex<CacheTable>,
}

impl LanguageStore {
    /// Load state from storage with the default keys and an unbounded cache.
    pub fn load(persister: Persister) -> Self {
        Self::load_with(persister, DEFAULT_LANGUAGE_KEY, DEFAULT_CACHE_KEY, None)
    }

    /// Load state from storage. A missing or unknown language falls back to the
    /// source language; a corrupt cache blob is treated as empty.
    pub fn load_with(
        persister: Persister,
        language_key: &str,
        cache_key: &str,
        cache_capacity: Option<usize>,
    ) -> Self {
        let current = match persister.read(language_key) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "stored language ignored");
                LanguageCode::SOURCE
            }),
            None => LanguageCode::SOURCE,
        };

        let mut cache = CacheTable::new(cache_capacity);
        if let Some(blob) = persister.read(cache_key) {
            match serde_json::from_str::<Vec<(String, Translations)>>(&blob) {
                Ok(entries) => cache.load(entries),
                Err(e) => warn!(error = %e, "translation cache blob corrupt, starting empty"),
            }
        }

        info!(language = %current, cached_texts = cache.len(), "language store loaded");

        Self {
            persister,
            language_key: language_key.to_string(),
            cache_key: cache_key.to_string(),
            current: RwLock::new(current),
            cache: Mutex::new(cache),
        }
    }

    pub fn current_language(&self) -> LanguageCode {
        *self.current.read()
    }

    /// Persist a new selection. Returns false (and writes nothing) when `lang`
    /// is already current.
    pub fn set_current_language(&self, lang: LanguageCode) -> bool {
        {
            let mut current = self.current.write();
            if *current == lang {
                return false;
            }
            *current = lang;
        }
        self.persister.write(&self.language_key, lang.code().to_string());
        info!(language = %lang, "language selected");
        true
    }

    pub fn get_cached(&self, text: &str, lang: LanguageCode) -> Option<String> {
        self.cache.lock().get(text)?.get(&lang).cloned()
    }

    /// Merge one translation into the cache and persist the full blob.
    pub fn put_cached(&self, text: &str, lang: LanguageCode, translation: &str) {
        let blob = {
            let mut cache = self.cache.lock();
            cache.entry(text).insert(lang, translation.to_string());
            serialize(&cache)
        };
        match blob {
            Some(blob) => self.persister.write(&self.cache_key, blob),
            None => warn!("translation cache serialization failed, not persisted"),
        }
    }

    /// Number of distinct source texts cached.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn cached_languages(&self, text: &str) -> Vec<LanguageCode> {
        let mut langs: Vec<_> = self
            .cache
            .lock()
            .get(text)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default();
        langs.sort();
        langs
    }

    /// Drop every cached translation. Only an explicit user action calls this.
    pub fn clear_cache(&self) {
        let blob = {
            let mut cache = self.cache.lock();
            cache.clear();
            serialize(&cache)
        };
        if let Some(blob) = blob {
            self.persister.write(&self.cache_key, blob);
        }
        debug!("translation cache cleared");
    }
}

fn serialize(cache: &CacheTable) -> Option<String> {
    serde_json::to_string(&cache.snapshot()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn store_over(storage: Arc<dyn Storage>) -> LanguageStore {
        LanguageStore::load(Persister::immediate(storage))
    }

    #[test]
    fn defaults_to_source_language() {
        let store = store_over(Arc::new(MemoryStorage::new()));
        assert_eq!(store.current_language(), LanguageCode::En);
    }

    #[test]
    fn setting_same_language_is_a_no_op() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = store_over(Arc::clone(&storage));
        assert!(!store.set_current_language(LanguageCode::En));
        assert_eq!(storage.get(DEFAULT_LANGUAGE_KEY).unwrap(), None);
        assert!(store.set_current_language(LanguageCode::Hi));
        assert_eq!(storage.get(DEFAULT_LANGUAGE_KEY).unwrap().as_deref(), Some("hi"));
    }

    #[test]
    fn cache_survives_reload() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = store_over(Arc::clone(&storage));
        store.set_current_language(LanguageCode::Hi);
        store.put_cached("Breaking News", LanguageCode::Hi, "ताज़ा खबर");
        store.put_cached("Breaking News", LanguageCode::Ta, "முக்கிய செய்தி");

        let reloaded = store_over(storage);
        assert_eq!(reloaded.current_language(), LanguageCode::Hi);
        assert_eq!(
            reloaded.get_cached("Breaking News", LanguageCode::Hi).as_deref(),
            Some("ताज़ा खबर")
        );
        assert_eq!(
            reloaded.cached_languages("Breaking News"),
            vec![LanguageCode::Hi, LanguageCode::Ta]
        );
    }

    #[test]
    fn corrupt_blob_means_empty_cache() {
        let storage = MemoryStorage::new()
            .with_entry(DEFAULT_CACHE_KEY, "{not json")
            .with_entry(DEFAULT_LANGUAGE_KEY, "klingon");
        let store = store_over(Arc::new(storage));
        assert_eq!(store.cache_len(), 0);
        assert_eq!(store.current_language(), LanguageCode::En);
    }

    #[test]
    fn bounded_cache_evicts_least_recent_text() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = LanguageStore::load_with(
            Persister::immediate(storage),
            DEFAULT_LANGUAGE_KEY,
            DEFAULT_CACHE_KEY,
            Some(2),
        );
        store.put_cached("one", LanguageCode::Hi, "एक");
        store.put_cached("two", LanguageCode::Hi, "दो");
        assert!(store.get_cached("one", LanguageCode::Hi).is_some());
        store.put_cached("three", LanguageCode::Hi, "तीन");

        assert_eq!(store.cache_len(), 2);
        assert!(store.get_cached("two", LanguageCode::Hi).is_none());
        assert!(store.get_cached("one", LanguageCode::Hi).is_some());
    }

    #[test]
    fn clear_cache_persists_empty_blob() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = store_over(Arc::clone(&storage));
        store.put_cached("one", LanguageCode::Hi, "एक");
        store.clear_cache();
        assert_eq!(storage.get(DEFAULT_CACHE_KEY).unwrap().as_deref(), Some("[]"));
    }
}
