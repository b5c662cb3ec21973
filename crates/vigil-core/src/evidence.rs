//! # Evidence
//!
//! An [`Evidence`] is a timestamped snapshot of one cloud resource, submitted
//! by a discovery tool. The wire form is permissive so that a malformed
//! submission can still be decoded and answered with a precise rejection
//! reason; [`Evidence::validate()`] is the gate into the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::resource::Resource;

/// A tool-submitted resource snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Unique evidence identifier (UUID).
    #[serde(default)]
    pub id: String,
    /// The certification target (service) the resource belongs to.
    #[serde(default)]
    pub certification_target_id: String,
    /// The tool that collected the evidence.
    #[serde(default)]
    pub tool_id: String,
    /// Collection time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// The resource payload, an object with at least `id` and `type`.
    #[serde(default)]
    pub resource: Option<Value>,
    /// Optional raw tool output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Ids of other resources whose evidence this assessment depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_resource_ids: Vec<String>,
}

impl Evidence {
    /// Check the evidence contract and return the id of the carried resource.
    ///
    /// Validation is pure: it reads the evidence and nothing else.
    pub fn validate(&self) -> Result<String, ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingEvidenceId);
        }
        if Uuid::parse_str(&self.id).is_err() {
            return Err(ValidationError::InvalidEvidenceId {
                id: self.id.clone(),
            });
        }
        if self.tool_id.is_empty() {
            return Err(ValidationError::MissingToolId);
        }
        if self.timestamp.is_none() {
            return Err(ValidationError::MissingTimestamp);
        }
        let resource = self.resource()?;
        if let Some(index) = self.related_resource_ids.iter().position(String::is_empty) {
            return Err(ValidationError::EmptyRelatedResourceId { index });
        }
        Ok(resource.id)
    }

    /// Decode the resource payload.
    pub fn resource(&self) -> Result<Resource, ValidationError> {
        let value = self
            .resource
            .as_ref()
            .ok_or(ValidationError::MissingResource)?;
        Resource::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Evidence {
        Evidence {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            certification_target_id: "00000000-0000-0000-0000-000000000000".to_string(),
            tool_id: "discovery".to_string(),
            timestamp: Some(Utc::now()),
            resource: Some(json!({
                "id": "vm1",
                "type": ["VirtualMachine", "Compute", "Resource"],
            })),
            raw: None,
            related_resource_ids: vec![],
        }
    }

    #[test]
    fn valid_evidence_yields_resource_id() {
        assert_eq!(valid().validate().unwrap(), "vm1");
    }

    #[test]
    fn decodes_camel_case_wire_form() {
        let evidence: Evidence = serde_json::from_value(json!({
            "id": "11111111-1111-1111-1111-111111111111",
            "certificationTargetId": "t",
            "toolId": "tool",
            "timestamp": "2024-01-01T00:00:00Z",
            "resource": {"id": "bucket", "type": ["ObjectStorage", "Storage", "Resource"]},
            "relatedResourceIds": ["account"],
        }))
        .unwrap();
        assert_eq!(evidence.tool_id, "tool");
        assert_eq!(evidence.related_resource_ids, vec!["account".to_string()]);
        assert_eq!(evidence.validate().unwrap(), "bucket");
    }

    #[test]
    fn missing_fields_are_named() {
        let mut e = valid();
        e.id.clear();
        assert_eq!(e.validate(), Err(ValidationError::MissingEvidenceId));

        let mut e = valid();
        e.id = "not-a-uuid".to_string();
        assert!(matches!(
            e.validate(),
            Err(ValidationError::InvalidEvidenceId { .. })
        ));

        let mut e = valid();
        e.tool_id.clear();
        assert_eq!(e.validate(), Err(ValidationError::MissingToolId));

        let mut e = valid();
        e.timestamp = None;
        assert_eq!(e.validate(), Err(ValidationError::MissingTimestamp));

        let mut e = valid();
        e.resource = None;
        assert_eq!(e.validate(), Err(ValidationError::MissingResource));
    }

    #[test]
    fn empty_related_id_is_rejected() {
        let mut e = valid();
        e.related_resource_ids = vec!["a".to_string(), String::new()];
        assert_eq!(
            e.validate(),
            Err(ValidationError::EmptyRelatedResourceId { index: 1 })
        );
    }

    #[test]
    fn resource_errors_surface_through_validate() {
        let mut e = valid();
        e.resource = Some(json!({"id": "vm1", "type": ["VirtualMachine"]}));
        assert!(matches!(
            e.validate(),
            Err(ValidationError::UnrecognizedResourceType { .. })
        ));
    }
}
