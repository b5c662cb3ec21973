//! # Policy Catalog Seam
//!
//! The evaluator treats the policy language as a black box behind two
//! traits:
//!
//! - [`PolicyCatalog`] enumerates the metrics it knows and turns a
//!   (metric, configuration) pair into a [`PreparedQuery`]. Preparation is
//!   the expensive step the query cache exists to avoid repeating.
//! - [`PreparedQuery`] runs against a resource's structured form and returns
//!   the raw result bindings, which the evaluator decodes into
//!   [`QueryBindings`].

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use vigil_core::{Metric, MetricConfiguration};

use crate::error::PolicyError;

/// A compiled, repeatedly executable query for one metric configuration.
pub trait PreparedQuery: Send + Sync + fmt::Debug {
    /// Run the query and return its result bindings.
    fn eval(&self, input: &Value) -> Result<Vec<Value>, PolicyError>;
}

/// Source of metric definitions.
pub trait PolicyCatalog: Send + Sync + fmt::Debug {
    /// All metrics, ordered by id.
    fn metrics(&self) -> Vec<Metric>;

    /// Load the metric's bundle, bind the configuration and prepare it.
    fn prepare(
        &self,
        metric_id: &str,
        config: &MetricConfiguration,
    ) -> Result<Arc<dyn PreparedQuery>, PolicyError>;
}

/// The bindings every metric query must produce.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueryBindings {
    /// Whether the metric applies to the resource.
    pub applicable: bool,
    /// Whether the resource complies.
    pub compliant: bool,
    /// Operator the query compared with.
    pub operator: String,
    /// Target value the query compared against.
    pub target_value: Value,
    /// Optional explanation for a non-compliant verdict.
    #[serde(default)]
    pub message: Option<String>,
}

impl QueryBindings {
    /// Decode the first binding of a query result set.
    pub fn decode(metric_id: &str, bindings: Vec<Value>) -> Result<Self, PolicyError> {
        let first = bindings
            .into_iter()
            .next()
            .ok_or_else(|| PolicyError::NoResults {
                metric_id: metric_id.to_string(),
            })?;
        serde_json::from_value(first).map_err(|e| PolicyError::InvalidBindings {
            metric_id: metric_id.to_string(),
            reason: e.to_string(),
        })
    }
}
