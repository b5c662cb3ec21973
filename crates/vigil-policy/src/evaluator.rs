//! # Policy Evaluator
//!
//! [`PolicyEvaluator::evaluate()`] runs every applicable metric of the
//! catalog against one resource.
//!
//! ## Algorithm
//!
//! 1. Derive the canonical type key of the resource's type tags. A resource
//!    without type tags is an error.
//! 2. Look the key up in the [`ResourceTypeCache`].
//!    - On a miss, scan the whole catalog. Each metric that reports itself
//!      applicable is recorded and its result kept; the recorded list is
//!      committed when the scan succeeds. Metrics without an implementation
//!      or configuration are skipped with a warning. Any other failure
//!      aborts the scan and commits nothing.
//!    - On a hit, run only the recorded metrics, in recorded order. A metric
//!      that no longer applies to this particular resource is omitted.
//! 3. Per metric: fetch the configuration for the evidence's certification
//!    target, fetch or build the prepared query keyed by metric id and
//!    configuration hash, run it, and decode the bindings.
//!
//! The result list is all-or-nothing: any error aborts the evaluation.

use std::sync::Arc;

use serde_json::{Map, Value};
use vigil_core::{resource_type_key, Evidence, MetricChangeEvent, Resource};

use crate::cache::{Lookup, QueryCache, ResourceTypeCache};
use crate::catalog::{PolicyCatalog, QueryBindings};
use crate::error::PolicyError;
use crate::source::ConfigurationSource;

/// Outcome of one applicable metric.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyResult {
    /// The evaluated metric.
    pub metric_id: String,
    /// Always true for returned results; kept for the record.
    pub applicable: bool,
    /// Whether the resource complies.
    pub compliant: bool,
    /// Operator the query compared with.
    pub operator: String,
    /// Target value the query compared against.
    pub target_value: Value,
    /// Explanation of a non-compliant verdict, if the query gave one.
    pub message: Option<String>,
}

/// Evaluates resources against a policy catalog, caching applicability and
/// prepared queries.
#[derive(Debug)]
pub struct PolicyEvaluator {
    catalog: Arc<dyn PolicyCatalog>,
    queries: QueryCache,
    types: ResourceTypeCache,
}

impl PolicyEvaluator {
    /// Create an evaluator with empty caches.
    pub fn new(catalog: Arc<dyn PolicyCatalog>) -> Self {
        Self {
            catalog,
            queries: QueryCache::new(),
            types: ResourceTypeCache::new(),
        }
    }

    /// Evaluate every applicable metric against `resource`.
    ///
    /// `related` resources are exposed to queries under the `related` key
    /// of the input, indexed by resource id.
    pub fn evaluate(
        &self,
        evidence: &Evidence,
        resource: &Resource,
        related: &[Resource],
        source: &dyn ConfigurationSource,
    ) -> Result<Vec<PolicyResult>, PolicyError> {
        if resource.types.is_empty() {
            return Err(PolicyError::NoTypeTags {
                resource_id: resource.id.clone(),
            });
        }

        let key = resource_type_key(&resource.types);
        let input = evaluation_input(resource, related);
        let target = evidence.certification_target_id.as_str();

        let lookup = self
            .types
            .lookup_or_discover(&key, || self.discover(target, &input, source))?;

        match lookup {
            Lookup::Discovered(results) => Ok(results),
            Lookup::Cached(metric_ids) => {
                let mut results = Vec::with_capacity(metric_ids.len());
                for metric_id in metric_ids.iter() {
                    let result = self.run_metric(metric_id, target, &input, source)?;
                    if result.applicable {
                        results.push(result);
                    } else {
                        tracing::debug!(
                            metric_id = %metric_id,
                            resource_id = %resource.id,
                            "recorded metric not applicable to this resource"
                        );
                    }
                }
                Ok(results)
            }
        }
    }

    /// Drop every cached query of the metric named by the event. Returns how
    /// many entries were evicted.
    pub fn handle_metric_event(&self, event: &MetricChangeEvent) -> usize {
        let evicted = self.queries.evict_metric(&event.metric_id);
        tracing::info!(
            metric_id = %event.metric_id,
            kind = ?event.kind,
            evicted,
            "metric changed; cached queries evicted"
        );
        evicted
    }

    /// The prepared-query cache.
    pub fn query_cache(&self) -> &QueryCache {
        &self.queries
    }

    /// The resource-type applicability cache.
    pub fn type_cache(&self) -> &ResourceTypeCache {
        &self.types
    }

    fn discover(
        &self,
        target: &str,
        input: &Value,
        source: &dyn ConfigurationSource,
    ) -> Result<(Vec<String>, Vec<PolicyResult>), PolicyError> {
        let mut metric_ids = Vec::new();
        let mut results = Vec::new();
        for metric in self.catalog.metrics() {
            match self.run_metric(&metric.id, target, input, source) {
                Ok(result) if result.applicable => {
                    metric_ids.push(metric.id);
                    results.push(result);
                }
                Ok(_) => {}
                Err(e) if e.is_missing_metric() => {
                    tracing::warn!(metric_id = %metric.id, error = %e, "skipping unavailable metric");
                }
                Err(e) => return Err(e),
            }
        }
        Ok((metric_ids, results))
    }

    fn run_metric(
        &self,
        metric_id: &str,
        target: &str,
        input: &Value,
        source: &dyn ConfigurationSource,
    ) -> Result<PolicyResult, PolicyError> {
        let config = source.metric_configuration(target, metric_id)?;
        let query = self
            .queries
            .get_or_prepare(metric_id, &config, || self.catalog.prepare(metric_id, &config))?;
        let bindings = QueryBindings::decode(metric_id, query.eval(input)?)?;
        Ok(PolicyResult {
            metric_id: metric_id.to_string(),
            applicable: bindings.applicable,
            compliant: bindings.compliant,
            operator: bindings.operator,
            target_value: bindings.target_value,
            message: bindings.message,
        })
    }
}

fn evaluation_input(resource: &Resource, related: &[Resource]) -> Value {
    let mut input = resource.structured();
    if !related.is_empty() {
        let by_id: Map<String, Value> = related
            .iter()
            .map(|r| (r.id.clone(), r.structured()))
            .collect();
        if let Value::Object(map) = &mut input {
            map.insert("related".to_string(), Value::Object(by_id));
        }
    }
    input
}
