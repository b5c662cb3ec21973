//! # Assessment Results
//!
//! One [`AssessmentResult`] is produced per (evidence, applicable metric)
//! pair. Results are transient: they are handed to hooks and to the results
//! stream and not retained by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;

/// The operator and target value a result was computed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultConfiguration {
    /// Comparison operator.
    pub operator: String,
    /// Target value.
    pub target_value: Value,
}

/// Outcome of evaluating one metric against one evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    /// Unique result identifier.
    pub id: Uuid,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
    /// The evaluated metric.
    pub metric_id: String,
    /// The configuration in effect.
    pub metric_configuration: ResultConfiguration,
    /// Whether the metric applied to the resource.
    pub applicable: bool,
    /// Whether the resource complied.
    pub compliant: bool,
    /// The evidence that was assessed.
    pub evidence_id: String,
    /// The assessed resource.
    pub resource_id: String,
    /// Type tags of the assessed resource.
    pub resource_types: Vec<String>,
    /// Certification target of the evidence.
    pub certification_target_id: String,
    /// Tool that submitted the evidence.
    pub tool_id: String,
    /// Explanation when not compliant.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub non_compliance_comments: String,
}

impl AssessmentResult {
    /// Check that every required field of the record is populated.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required: [(&'static str, bool); 6] = [
            ("metricId", self.metric_id.is_empty()),
            ("metricConfiguration.operator", self.metric_configuration.operator.is_empty()),
            ("evidenceId", self.evidence_id.is_empty()),
            ("resourceId", self.resource_id.is_empty()),
            ("resourceTypes", self.resource_types.is_empty()),
            ("toolId", self.tool_id.is_empty()),
        ];
        if self.id.is_nil() {
            return Err(ValidationError::MissingResultField { field: "id" });
        }
        match required.iter().find(|(_, missing)| *missing) {
            Some((field, _)) => Err(ValidationError::MissingResultField { field: *field }),
            None => Ok(()),
        }
    }
}

/// Status of one evidence submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentStatus {
    /// The evidence was assessed and results were emitted.
    Assessed,
    /// The evidence waits for related resources to arrive.
    WaitingForRelated,
    /// The evidence was rejected or could not be assessed.
    Failed,
}

/// Response to one evidence submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessEvidenceResponse {
    /// Outcome.
    pub status: AssessmentStatus,
    /// Human-readable reason; always set for `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AssessEvidenceResponse {
    /// A successful assessment.
    pub fn assessed() -> Self {
        Self {
            status: AssessmentStatus::Assessed,
            message: None,
        }
    }

    /// A deferred assessment.
    pub fn waiting() -> Self {
        Self {
            status: AssessmentStatus::WaitingForRelated,
            message: None,
        }
    }

    /// A failed assessment with its reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: AssessmentStatus::Failed,
            message: Some(reason.into()),
        }
    }
}
