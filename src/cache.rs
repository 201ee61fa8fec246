//! Process-local memoization of expensive manifest computations.
//!
//! Two levels, mirroring the analysis pipeline:
//!
//! 1. manifest content hash -> lineage graph
//! 2. (manifest hash, session properties hash, mode) -> analyzed manifest
//!
//! Both caches are bounded LRU maps behind a mutex. At-most-once
//! computation is deliberately not guaranteed: two threads missing on the
//! same key both compute, and the last insert wins. Keys are structural
//! hashes of the inputs, stable across processes.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::error::PlanResult;
use crate::lineage::Lineage;
use crate::manifest::Manifest;
use crate::mdl::{AnalysisMode, AnalyzedManifest, SessionProperties};

/// Entries kept per lineage cache.
const LINEAGE_CAPACITY: usize = 100;
/// Analyzed manifests are heavier; keep fewer.
const ANALYZED_CAPACITY: usize = 50;

/// A bounded LRU map. Small capacities make the O(capacity) eviction scan
/// irrelevant next to the computations being memoized.
pub struct LruCache<K, V> {
    inner: Mutex<LruInner<K, V>>,
    capacity: usize,
}

struct LruInner<K, V> {
    entries: HashMap<K, (V, u64)>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.get_mut(key).map(|entry| {
            entry.1 = tick;
            entry.0.clone()
        })
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(key, (value, tick));
        if inner.entries.len() > self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("cache mutex poisoned")
            .entries
            .clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LineageKey {
    manifest_hash: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AnalyzedKey {
    manifest_hash: u64,
    properties_hash: u64,
    mode: AnalysisMode,
}

static LINEAGE_CACHE: OnceLock<LruCache<LineageKey, Arc<Lineage>>> = OnceLock::new();
static ANALYZED_CACHE: OnceLock<LruCache<AnalyzedKey, Arc<AnalyzedManifest>>> = OnceLock::new();

fn lineage_cache() -> &'static LruCache<LineageKey, Arc<Lineage>> {
    LINEAGE_CACHE.get_or_init(|| LruCache::new(LINEAGE_CAPACITY))
}

fn analyzed_cache() -> &'static LruCache<AnalyzedKey, Arc<AnalyzedManifest>> {
    ANALYZED_CACHE.get_or_init(|| LruCache::new(ANALYZED_CAPACITY))
}

fn hash_properties(properties: &SessionProperties) -> u64 {
    let mut hasher = DefaultHasher::new();
    // BTreeMap iterates in key order; the hash is independent of insertion
    // history.
    for (key, value) in properties {
        key.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Lineage for a manifest, memoized on its content hash.
pub fn compute_lineage_cached(manifest: &Arc<Manifest>) -> PlanResult<Arc<Lineage>> {
    let key = LineageKey {
        manifest_hash: manifest.content_hash(),
    };
    if let Some(cached) = lineage_cache().get(&key) {
        debug!("lineage cache hit for manifest {:016x}", key.manifest_hash);
        return Ok(cached);
    }
    debug!("lineage cache miss for manifest {:016x}", key.manifest_hash);
    let lineage = Arc::new(Lineage::analyze(Arc::clone(manifest))?);
    lineage_cache().insert(key, Arc::clone(&lineage));
    Ok(lineage)
}

/// Analyzed manifest, memoized on `(manifest, properties, mode)`.
pub fn compute_analyzed_cached(
    manifest: Manifest,
    properties: SessionProperties,
    mode: AnalysisMode,
) -> PlanResult<Arc<AnalyzedManifest>> {
    let key = AnalyzedKey {
        manifest_hash: manifest.content_hash(),
        properties_hash: hash_properties(&properties),
        mode,
    };
    if let Some(cached) = analyzed_cache().get(&key) {
        debug!(
            "analyzed manifest cache hit for {:016x}/{:016x}",
            key.manifest_hash, key.properties_hash
        );
        return Ok(cached);
    }
    debug!(
        "analyzed manifest cache miss for {:016x}/{:016x}",
        key.manifest_hash, key.properties_hash
    );
    let analyzed = Arc::new(AnalyzedManifest::analyze_uncached(
        Arc::new(manifest),
        properties,
        mode,
    )?);
    analyzed_cache().insert(key, Arc::clone(&analyzed));
    Ok(analyzed)
}

/// Drop every memoized value. Exposed for embedders and tests.
pub fn clear() {
    if let Some(cache) = LINEAGE_CACHE.get() {
        cache.clear();
    }
    if let Some(cache) = ANALYZED_CACHE.get() {
        cache.clear();
    }
}

/// `(lineage entries, analyzed entries)`, for monitoring.
pub fn stats() -> (usize, usize) {
    (
        LINEAGE_CACHE.get().map(LruCache::len).unwrap_or(0),
        ANALYZED_CACHE.get().map(LruCache::len).unwrap_or(0),
    )
}
