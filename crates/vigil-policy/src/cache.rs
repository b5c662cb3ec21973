//! # Evaluation Caches
//!
//! Two caches sit in front of the policy catalog:
//!
//! - [`QueryCache`] maps `"{metric_id}-{configuration hash}"` to a prepared
//!   query. Population goes through the `DashMap` entry API: the shard
//!   stays write-locked while the query is built, so each key is built at
//!   most once, and a failed build leaves the vacant entry untouched.
//!
//! - [`ResourceTypeCache`] maps a canonical type key to the ids of the
//!   metrics applicable to that resource type. Each key owns a slot guarded
//!   by its own mutex. The first caller to find the slot empty runs the
//!   discovery scan while holding the slot; concurrent callers for the same
//!   key wait and then read the committed list. A failed scan commits
//!   nothing.
//!
//! ## Lock Order
//!
//! The two caches are deliberately nested: discovery scans and evaluates
//! every metric while holding its type slot, and each evaluation may lock a
//! query shard. The order is always type slot, then query shard, and
//! nothing locks a type slot while holding a query shard, so the nesting
//! cannot deadlock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use vigil_core::MetricConfiguration;

use crate::catalog::PreparedQuery;
use crate::error::PolicyError;

/// Cache key of a prepared query.
pub fn query_key(metric_id: &str, config_hash: &str) -> String {
    format!("{metric_id}-{config_hash}")
}

// ---------------------------------------------------------------------------
// Query cache
// ---------------------------------------------------------------------------

/// Prepared queries keyed by metric id and configuration hash.
#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<String, Arc<dyn PreparedQuery>>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl QueryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached query for `config`, building it with `build` on a
    /// miss. The built query is committed only if `build` succeeds.
    pub fn get_or_prepare<F>(
        &self,
        metric_id: &str,
        config: &MetricConfiguration,
        build: F,
    ) -> Result<Arc<dyn PreparedQuery>, PolicyError>
    where
        F: FnOnce() -> Result<Arc<dyn PreparedQuery>, PolicyError>,
    {
        let key = query_key(metric_id, &config.hash());
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let query = build()?;
                tracing::debug!(key = %entry.key(), "prepared policy query");
                entry.insert(Arc::clone(&query));
                Ok(query)
            }
        }
    }

    /// Whether a query for this metric and configuration hash is cached.
    pub fn contains(&self, metric_id: &str, config_hash: &str) -> bool {
        self.entries.contains_key(&query_key(metric_id, config_hash))
    }

    /// Drop every cached query of a metric. Returns how many were removed.
    pub fn evict_metric(&self, metric_id: &str) -> usize {
        let prefix = format!("{metric_id}-");
        let before = self.entries.len();
        // Hashes are hex, so a key of this metric has no '-' after the prefix.
        self.entries.retain(|key, _| match key.strip_prefix(&prefix) {
            Some(hash) => hash.contains('-'),
            None => true,
        });
        before.saturating_sub(self.entries.len())
    }

    /// Number of cached queries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resource-type cache
// ---------------------------------------------------------------------------

type Slot = Arc<Mutex<Option<Arc<[String]>>>>;

/// Outcome of [`ResourceTypeCache::lookup_or_discover`].
#[derive(Debug)]
pub enum Lookup<T> {
    /// The metric list was already committed for this key.
    Cached(Arc<[String]>),
    /// This caller ran discovery; carries its by-product.
    Discovered(T),
}

/// Applicable metric ids keyed by canonical resource type key.
#[derive(Debug, Default)]
pub struct ResourceTypeCache {
    slots: DashMap<String, Slot>,
}

impl ResourceTypeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the committed metric ids for `key`, or run `discover` and
    /// commit the ids it returns. Concurrent misses on one key run
    /// `discover` once.
    pub fn lookup_or_discover<T, E, F>(&self, key: &str, discover: F) -> Result<Lookup<T>, E>
    where
        F: FnOnce() -> Result<(Vec<String>, T), E>,
    {
        let slot = Arc::clone(&*self.slots.entry(key.to_string()).or_default());
        let mut guard = slot.lock();
        if let Some(ids) = guard.as_ref() {
            return Ok(Lookup::Cached(Arc::clone(ids)));
        }
        let (ids, output) = discover()?;
        tracing::info!(key, metrics = ids.len(), "cached applicable metrics for resource type");
        *guard = Some(ids.into());
        Ok(Lookup::Discovered(output))
    }

    /// The committed metric ids for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<[String]>> {
        let slot = self.slots.get(key).map(|s| Arc::clone(&*s))?;
        let ids = slot.lock().clone();
        ids
    }

    /// Number of keys with a committed metric list.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value().lock().is_some()).count()
    }

    /// Whether no key has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[derive(Debug)]
    struct Constant;

    impl PreparedQuery for Constant {
        fn eval(&self, _input: &Value) -> Result<Vec<Value>, PolicyError> {
            Ok(vec![json!({})])
        }
    }

    fn config(target: i64) -> MetricConfiguration {
        MetricConfiguration::new("M", "==", json!(target))
    }

    #[test]
    fn concurrent_misses_build_once() {
        let cache = QueryCache::new();
        let builds = AtomicUsize::new(0);
        let barrier = Barrier::new(16);
        let cfg = config(1);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    barrier.wait();
                    cache
                        .get_or_prepare("M", &cfg, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(Arc::new(Constant) as Arc<dyn PreparedQuery>)
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_build_is_not_committed() {
        let cache = QueryCache::new();
        let cfg = config(1);
        let err = cache.get_or_prepare("M", &cfg, || {
            Err(PolicyError::Prepare {
                metric_id: "M".into(),
                reason: "broken bundle".into(),
            })
        });
        assert!(err.is_err());
        assert!(cache.is_empty());

        cache
            .get_or_prepare("M", &cfg, || Ok(Arc::new(Constant) as Arc<dyn PreparedQuery>))
            .unwrap();
        assert!(cache.contains("M", &cfg.hash()));
    }

    #[test]
    fn new_hash_gets_new_entry_and_old_one_stays() {
        let cache = QueryCache::new();
        let old = config(1);
        let new = config(2);
        for cfg in [&old, &new] {
            cache
                .get_or_prepare("M", cfg, || Ok(Arc::new(Constant) as Arc<dyn PreparedQuery>))
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("M", &old.hash()));
        assert!(cache.contains("M", &new.hash()));
    }

    #[test]
    fn eviction_only_touches_the_named_metric() {
        let cache = QueryCache::new();
        let build = || Ok(Arc::new(Constant) as Arc<dyn PreparedQuery>);
        let a = MetricConfiguration::new("M", "==", json!(1));
        let b = MetricConfiguration::new("M-Extra", "==", json!(1));
        cache.get_or_prepare("M", &a, build).unwrap();
        cache.get_or_prepare("M", &config(2), build).unwrap();
        cache.get_or_prepare("M-Extra", &b, build).unwrap();

        assert_eq!(cache.evict_metric("M"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("M-Extra", &b.hash()));
    }

    #[test]
    fn type_cache_discovers_once_per_key() {
        let cache = ResourceTypeCache::new();
        let scans = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    let lookup = cache
                        .lookup_or_discover("VirtualMachine-Compute-Resource", || {
                            scans.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, PolicyError>((vec!["A".to_string(), "B".to_string()], ()))
                        })
                        .unwrap();
                    if let Lookup::Cached(ids) = lookup {
                        assert_eq!(ids.len(), 2);
                    }
                });
            }
        });

        assert_eq!(scans.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("VirtualMachine-Compute-Resource").unwrap().to_vec(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn failed_discovery_commits_nothing() {
        let cache = ResourceTypeCache::new();
        let result = cache.lookup_or_discover::<(), _, _>("Key", || {
            Err(PolicyError::Eval {
                metric_id: "M".into(),
                reason: "boom".into(),
            })
        });
        assert!(result.is_err());
        assert!(cache.get("Key").is_none());
        assert!(cache.is_empty());

        let retry = cache
            .lookup_or_discover("Key", || Ok::<_, PolicyError>((vec![], 7)))
            .unwrap();
        assert!(matches!(retry, Lookup::Discovered(7)));
        assert!(matches!(
            cache.lookup_or_discover("Key", || Ok::<_, PolicyError>((vec![], 8))).unwrap(),
            Lookup::Cached(_)
        ));
    }
}
