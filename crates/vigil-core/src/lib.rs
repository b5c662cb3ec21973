//! # vigil-core — Foundational Types for Vigil
//!
//! This crate is the leaf of the Vigil workspace. It defines the data that
//! flows through the assessment pipeline: the evidence a discovery tool
//! submits, the resource snapshot carried inside it, the metric
//! configuration a policy is evaluated against, and the assessment result
//! records produced for each (evidence, metric) pair.
//!
//! ## Key Design Principles
//!
//! 1. **Permissive wire types, strict validation.** [`Evidence`] deserializes
//!    whatever a tool sends; [`Evidence::validate()`] is the single gate that
//!    decides whether it can enter the pipeline. Rejections carry a
//!    [`ValidationError`] that names the offending field.
//!
//! 2. **Type tags are ordered.** A resource's type hierarchy runs from the
//!    most specific tag to the ontology root ([`ROOT_RESOURCE_TYPE`]). The
//!    canonical cache key ([`resource_type_key`]) preserves that order.
//!
//! 3. **Configuration hashes are content hashes.** [`MetricConfiguration::hash()`]
//!    digests the operator and the canonical JSON of the target value, so any
//!    change to the effective configuration yields a new hash.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vigil-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod evidence;
pub mod metric;
pub mod resource;
pub mod result;

// Re-export primary types for ergonomic imports.
pub use error::ValidationError;
pub use evidence::Evidence;
pub use metric::{Metric, MetricChangeEvent, MetricChangeKind, MetricConfiguration};
pub use resource::{resource_type_key, Resource, ROOT_RESOURCE_TYPE};
pub use result::{AssessEvidenceResponse, AssessmentResult, AssessmentStatus, ResultConfiguration};
