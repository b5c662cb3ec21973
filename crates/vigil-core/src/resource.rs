//! # Resource Snapshots
//!
//! A [`Resource`] is the structured view of the payload carried inside an
//! evidence: a stable id, an ordered type-tag hierarchy and the remaining
//! observed properties.
//!
//! The payload arrives as an arbitrary JSON object. [`Resource::from_value()`]
//! checks the shape the rest of the pipeline relies on:
//!
//! - the payload is an object,
//! - `id` is present, a string, and not empty,
//! - `type` is present, a non-empty array of strings,
//! - the hierarchy ends in the ontology root [`ROOT_RESOURCE_TYPE`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// The root of every resource type hierarchy.
pub const ROOT_RESOURCE_TYPE: &str = "Resource";

/// A cloud resource as observed by a discovery tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable resource identifier.
    pub id: String,
    /// Type tags, most specific first, e.g. `["VirtualMachine", "Compute", "Resource"]`.
    #[serde(rename = "type")]
    pub types: Vec<String>,
    /// All other observed properties.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Resource {
    /// Parse and validate a resource payload.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = value.as_object().ok_or(ValidationError::ResourceNotStruct)?;

        let id = match map.get("id") {
            None => return Err(ValidationError::ResourceIdFieldMissing),
            Some(Value::String(s)) if s.is_empty() => return Err(ValidationError::ResourceIdEmpty),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ValidationError::ResourceIdNotString),
        };

        let raw_types = match map.get("type") {
            None => return Err(ValidationError::ResourceTypeFieldMissing),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ValidationError::ResourceTypeNotArrayOfStrings),
        };
        if raw_types.is_empty() {
            return Err(ValidationError::ResourceTypeEmpty);
        }
        let types = raw_types
            .iter()
            .map(|t| {
                t.as_str()
                    .map(str::to_string)
                    .ok_or(ValidationError::ResourceTypeNotArrayOfStrings)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if types.last().map(String::as_str) != Some(ROOT_RESOURCE_TYPE) {
            return Err(ValidationError::UnrecognizedResourceType { types });
        }

        let properties = map
            .iter()
            .filter(|(k, _)| k.as_str() != "id" && k.as_str() != "type")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            id,
            types,
            properties,
        })
    }

    /// The structured form policies are evaluated against: all properties
    /// plus `id` and `type`.
    pub fn structured(&self) -> Value {
        let mut map = self.properties.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert(
            "type".to_string(),
            Value::Array(self.types.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(map)
    }

    /// Whether this resource carries the given type tag.
    pub fn has_type(&self, tag: &str) -> bool {
        self.types.iter().any(|t| t == tag)
    }
}

/// Canonical cache key for a type-tag hierarchy.
///
/// Tags are joined in their hierarchy order with `-`; whitespace inside a
/// tag is dropped.
pub fn resource_type_key(types: &[String]) -> String {
    types
        .iter()
        .map(|t| t.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_virtual_machine_payload() {
        let value = json!({
            "id": "/compute/vm1",
            "type": ["VirtualMachine", "Compute", "Resource"],
            "bootLogging": {"enabled": true},
        });
        let resource = Resource::from_value(&value).unwrap();
        assert_eq!(resource.id, "/compute/vm1");
        assert_eq!(resource.types.len(), 3);
        assert!(resource.has_type("Compute"));
        assert!(resource.properties.contains_key("bootLogging"));
        assert!(!resource.properties.contains_key("id"));
    }

    #[test]
    fn structured_form_contains_id_and_type() {
        let value = json!({"id": "r", "type": ["Account", "Resource"], "name": "acc"});
        let resource = Resource::from_value(&value).unwrap();
        assert_eq!(resource.structured(), value);
    }

    #[test]
    fn rejects_non_object() {
        assert_eq!(
            Resource::from_value(&json!("vm")),
            Err(ValidationError::ResourceNotStruct)
        );
    }

    #[test]
    fn rejects_missing_or_bad_id() {
        let missing = json!({"type": ["Resource"]});
        assert_eq!(
            Resource::from_value(&missing),
            Err(ValidationError::ResourceIdFieldMissing)
        );
        let empty = json!({"id": "", "type": ["Resource"]});
        assert_eq!(Resource::from_value(&empty), Err(ValidationError::ResourceIdEmpty));
        let number = json!({"id": 4, "type": ["Resource"]});
        assert_eq!(
            Resource::from_value(&number),
            Err(ValidationError::ResourceIdNotString)
        );
    }

    #[test]
    fn rejects_bad_type_lists() {
        let missing = json!({"id": "r"});
        assert_eq!(
            Resource::from_value(&missing),
            Err(ValidationError::ResourceTypeFieldMissing)
        );
        let empty = json!({"id": "r", "type": []});
        assert_eq!(Resource::from_value(&empty), Err(ValidationError::ResourceTypeEmpty));
        let mixed = json!({"id": "r", "type": ["VirtualMachine", 3]});
        assert_eq!(
            Resource::from_value(&mixed),
            Err(ValidationError::ResourceTypeNotArrayOfStrings)
        );
        let scalar = json!({"id": "r", "type": "VirtualMachine"});
        assert_eq!(
            Resource::from_value(&scalar),
            Err(ValidationError::ResourceTypeNotArrayOfStrings)
        );
    }

    #[test]
    fn rejects_hierarchy_without_root() {
        let value = json!({"id": "r", "type": ["VirtualMachine", "Compute"]});
        assert!(matches!(
            Resource::from_value(&value),
            Err(ValidationError::UnrecognizedResourceType { .. })
        ));
    }

    #[test]
    fn type_key_preserves_order_and_strips_spaces() {
        let types = vec![
            "Virtual Machine".to_string(),
            "Compute".to_string(),
            "Resource".to_string(),
        ];
        assert_eq!(resource_type_key(&types), "VirtualMachine-Compute-Resource");
        let reversed: Vec<String> = types.iter().rev().cloned().collect();
        assert_ne!(resource_type_key(&types), resource_type_key(&reversed));
    }
}
