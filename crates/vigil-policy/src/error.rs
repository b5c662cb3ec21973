//! # Error Types — Policy Evaluation
//!
//! Every failure of the evaluation path is a [`PolicyError`]. Errors are
//! values, never panics: a catalog that cannot prepare a query, a query that
//! cannot run, or a configuration that cannot be found all surface here and
//! are reported against the evidence being assessed.

use thiserror::Error;

/// Errors raised while discovering, preparing or running metric queries.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The resource carries no type tags, so no applicability key exists.
    #[error("resource {resource_id:?} has no type tags")]
    NoTypeTags {
        /// The offending resource.
        resource_id: String,
    },

    /// The catalog has no implementation for the metric.
    #[error("metric {metric_id} has no implementation in the catalog")]
    MetricNotFound {
        /// The unknown metric.
        metric_id: String,
    },

    /// No configuration (override or default) exists for the metric.
    #[error("no configuration for metric {metric_id} (target {target_id:?})")]
    ConfigurationNotFound {
        /// The metric that was looked up.
        metric_id: String,
        /// The certification target that was looked up.
        target_id: String,
    },

    /// A configuration names an operator the rule language does not know.
    #[error("unknown operator {operator:?}")]
    UnknownOperator {
        /// The operator as configured.
        operator: String,
    },

    /// Building the prepared query failed.
    #[error("could not prepare query for metric {metric_id}: {reason}")]
    Prepare {
        /// The metric being prepared.
        metric_id: String,
        /// Why preparation failed.
        reason: String,
    },

    /// Running a prepared query failed.
    #[error("could not evaluate metric {metric_id}: {reason}")]
    Eval {
        /// The metric being evaluated.
        metric_id: String,
        /// Why evaluation failed.
        reason: String,
    },

    /// A query ran but bound nothing, which means the catalog is wired to
    /// the wrong package.
    #[error("metric {metric_id} produced no result bindings; check the catalog wiring")]
    NoResults {
        /// The metric whose query was empty.
        metric_id: String,
    },

    /// A query bound values that do not match the result contract.
    #[error("metric {metric_id} produced malformed result bindings: {reason}")]
    InvalidBindings {
        /// The metric whose bindings were malformed.
        metric_id: String,
        /// Decoder message.
        reason: String,
    },

    /// A rule bundle could not be parsed.
    #[error("invalid rule bundle {path}: {reason}")]
    Bundle {
        /// Where the bundle came from.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// Two bundles declare the same metric id.
    #[error("metric {metric_id} is declared more than once")]
    DuplicateMetric {
        /// The duplicated id.
        metric_id: String,
    },

    /// Reading the catalog from disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    /// Whether the error means the metric is simply not available: no
    /// implementation or no configuration. Discovery skips such metrics.
    pub fn is_missing_metric(&self) -> bool {
        matches!(
            self,
            Self::MetricNotFound { .. } | Self::ConfigurationNotFound { .. }
        )
    }
}
