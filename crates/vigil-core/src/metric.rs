//! # Metrics and Metric Configurations
//!
//! A [`Metric`] is a single compliance rule. Its effective parameters, the
//! comparison operator and the target value, live in a
//! [`MetricConfiguration`] which may differ per certification target and may
//! change at runtime.
//!
//! ## Configuration Hash
//!
//! [`MetricConfiguration::hash()`] is the SHA-256 of
//! `"{operator}-{canonical target value}"`, rendered as lowercase hex. The
//! target value is serialized through `serde_json::Value`, whose object maps
//! are key-sorted, so two semantically equal configurations always hash the
//! same. Metadata (`is_default`, `updated_at`) does not contribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Catalog metadata of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    /// Metric identifier, e.g. `AutomaticUpdatesEnabled`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the metric checks.
    #[serde(default)]
    pub description: String,
    /// Grouping category, e.g. `Logging`.
    #[serde(default)]
    pub category: String,
}

/// The effective operator and target value of a metric for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfiguration {
    /// The metric this configuration parameterises.
    #[serde(default)]
    pub metric_id: String,
    /// The certification target this configuration applies to; empty for
    /// catalog defaults.
    #[serde(default)]
    pub target_id: String,
    /// Comparison operator, e.g. `==` or `>=`.
    pub operator: String,
    /// Value the observed property is compared against.
    pub target_value: Value,
    /// Whether this is the catalog default rather than an override.
    #[serde(default)]
    pub is_default: bool,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MetricConfiguration {
    /// Build a configuration for a metric.
    pub fn new(metric_id: impl Into<String>, operator: impl Into<String>, target_value: Value) -> Self {
        Self {
            metric_id: metric_id.into(),
            target_id: String::new(),
            operator: operator.into(),
            target_value,
            is_default: false,
            updated_at: None,
        }
    }

    /// Content hash of the effective configuration.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.operator.as_bytes());
        hasher.update(b"-");
        hasher.update(self.target_value.to_string().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// What changed about a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricChangeKind {
    /// The configuration (operator or target value) changed.
    ConfigChanged,
    /// The policy implementation changed.
    ImplementationChanged,
}

/// Notification that a metric changed and derived state must be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricChangeEvent {
    /// The affected metric.
    pub metric_id: String,
    /// What changed.
    pub kind: MetricChangeKind,
}
