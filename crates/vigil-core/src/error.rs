//! # Error Types — Evidence Validation
//!
//! Validation errors raised when inbound evidence (or a result record) does
//! not satisfy the evidence contract. All errors use `thiserror` for
//! derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Every variant names the field that failed, so the message can be
//!   returned verbatim as the reason of a `Failed` assessment status.
//! - Validation has no side effects: a rejected evidence never reaches the
//!   caches or the waiting registry.

use thiserror::Error;

/// Reasons an evidence (or a derived record) is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The evidence id is empty.
    #[error("evidence id is missing")]
    MissingEvidenceId,

    /// The evidence id is not a UUID.
    #[error("evidence id {id:?} is not a valid UUID")]
    InvalidEvidenceId {
        /// The rejected identifier.
        id: String,
    },

    /// The tool id is empty.
    #[error("tool id is missing")]
    MissingToolId,

    /// The evidence carries no timestamp.
    #[error("timestamp is missing")]
    MissingTimestamp,

    /// The evidence carries no resource payload.
    #[error("resource is missing")]
    MissingResource,

    /// The resource payload is not a JSON object.
    #[error("resource is not a structured value")]
    ResourceNotStruct,

    /// The resource payload has no `id` field.
    #[error("resource id field is missing")]
    ResourceIdFieldMissing,

    /// The resource `id` field is not a string.
    #[error("resource id field is not a string")]
    ResourceIdNotString,

    /// The resource `id` field is an empty string.
    #[error("resource id is empty")]
    ResourceIdEmpty,

    /// The resource payload has no `type` field.
    #[error("resource type field is missing")]
    ResourceTypeFieldMissing,

    /// The resource `type` field is not an array of strings.
    #[error("resource type field is not an array of strings")]
    ResourceTypeNotArrayOfStrings,

    /// The resource `type` array is empty.
    #[error("resource type list is empty")]
    ResourceTypeEmpty,

    /// The type hierarchy does not end in the ontology root.
    #[error("resource type {types:?} is not a recognized ontology resource")]
    UnrecognizedResourceType {
        /// The type tags as submitted.
        types: Vec<String>,
    },

    /// One of the related resource ids is empty.
    #[error("related resource id at position {index} is empty")]
    EmptyRelatedResourceId {
        /// Position in the related-resource list.
        index: usize,
    },

    /// A generated record is missing a required field.
    #[error("assessment result field {field} is missing")]
    MissingResultField {
        /// Name of the missing field.
        field: &'static str,
    },
}
