//! # Configuration Sources
//!
//! A [`ConfigurationSource`] answers "which operator and target value apply
//! to this metric for this certification target". Implementations must be
//! safe to call from many evaluations at once, and the configuration they
//! return must hash differently whenever its effective content changes.
//!
//! Two composable sources are provided:
//!
//! - [`ConfigurationOverrides`] layers per-target overrides set at runtime
//!   over a fallback source (typically the catalog's defaults).
//! - [`CachingConfigurationSource`] memoises an upstream source per
//!   (target, metric) for a fixed eviction time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use vigil_core::MetricConfiguration;

use crate::error::PolicyError;

/// Default eviction time of [`CachingConfigurationSource`].
pub const DEFAULT_CONFIGURATION_TTL: Duration = Duration::from_secs(3600);

/// Supplies the effective configuration of a metric.
pub trait ConfigurationSource: Send + Sync {
    /// Configuration of `metric_id` for the certification target `target_id`.
    fn metric_configuration(
        &self,
        target_id: &str,
        metric_id: &str,
    ) -> Result<MetricConfiguration, PolicyError>;
}

impl<T: ConfigurationSource + ?Sized> ConfigurationSource for Arc<T> {
    fn metric_configuration(
        &self,
        target_id: &str,
        metric_id: &str,
    ) -> Result<MetricConfiguration, PolicyError> {
        (**self).metric_configuration(target_id, metric_id)
    }
}

type TargetMetric = (String, String);

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Runtime per-target overrides on top of a fallback source.
pub struct ConfigurationOverrides {
    fallback: Arc<dyn ConfigurationSource>,
    overrides: RwLock<HashMap<TargetMetric, MetricConfiguration>>,
}

impl ConfigurationOverrides {
    /// Wrap a fallback source with an empty override table.
    pub fn new(fallback: Arc<dyn ConfigurationSource>) -> Self {
        Self {
            fallback,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Set the configuration of `config.metric_id` for `config.target_id`.
    pub fn set(&self, config: MetricConfiguration) {
        let key = (config.target_id.clone(), config.metric_id.clone());
        tracing::info!(
            target_id = %key.0,
            metric_id = %key.1,
            operator = %config.operator,
            "metric configuration overridden"
        );
        self.overrides.write().insert(key, config);
    }

    /// Remove an override. Returns whether one existed.
    pub fn remove(&self, target_id: &str, metric_id: &str) -> bool {
        self.overrides
            .write()
            .remove(&(target_id.to_string(), metric_id.to_string()))
            .is_some()
    }
}

impl ConfigurationSource for ConfigurationOverrides {
    fn metric_configuration(
        &self,
        target_id: &str,
        metric_id: &str,
    ) -> Result<MetricConfiguration, PolicyError> {
        let found = self
            .overrides
            .read()
            .get(&(target_id.to_string(), metric_id.to_string()))
            .cloned();
        match found {
            Some(config) => Ok(config),
            None => self.fallback.metric_configuration(target_id, metric_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

/// Memoises an upstream source per (target, metric).
///
/// Every invalidation bumps a generation counter. A fetch commits its
/// result only if no invalidation happened while it ran, so an override
/// applied mid-fetch is never shadowed by the configuration it replaced.
pub struct CachingConfigurationSource {
    upstream: Arc<dyn ConfigurationSource>,
    ttl: Duration,
    entries: DashMap<TargetMetric, (MetricConfiguration, Instant)>,
    generation: Mutex<u64>,
}

impl CachingConfigurationSource {
    /// Cache `upstream` with the given eviction time.
    pub fn new(upstream: Arc<dyn ConfigurationSource>, ttl: Duration) -> Self {
        Self {
            upstream,
            ttl,
            entries: DashMap::new(),
            generation: Mutex::new(0),
        }
    }

    /// Drop the cached configuration of one metric for one target.
    pub fn invalidate(&self, target_id: &str, metric_id: &str) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.entries
            .remove(&(target_id.to_string(), metric_id.to_string()));
    }

    /// Drop the cached configuration of a metric for every target.
    pub fn invalidate_metric(&self, metric_id: &str) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.entries.retain(|(_, metric), _| metric != metric_id);
    }

    /// Number of cached configurations, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigurationSource for CachingConfigurationSource {
    fn metric_configuration(
        &self,
        target_id: &str,
        metric_id: &str,
    ) -> Result<MetricConfiguration, PolicyError> {
        let key = (target_id.to_string(), metric_id.to_string());
        if let Some(entry) = self.entries.get(&key) {
            let (config, fetched) = entry.value();
            if fetched.elapsed() < self.ttl {
                return Ok(config.clone());
            }
        }
        let started = *self.generation.lock();
        let config = self.upstream.metric_configuration(target_id, metric_id)?;
        // Lock order: generation, then entry shard.
        let generation = self.generation.lock();
        if *generation == started {
            self.entries.insert(key, (config.clone(), Instant::now()));
        } else {
            tracing::debug!(
                target_id = %target_id,
                metric_id = %metric_id,
                "configuration invalidated during fetch; not caching"
            );
        }
        Ok(config)
    }
}
