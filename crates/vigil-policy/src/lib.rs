//! # vigil-policy — Policy Evaluation Cache
//!
//! Decides which metrics apply to a resource and evaluates them, without
//! re-discovering applicability or re-preparing queries on every request.
//!
//! ## Architecture
//!
//! - **Catalog** (`catalog.rs`): the [`PolicyCatalog`] / [`PreparedQuery`]
//!   seam. The policy language is a black box behind these traits.
//!
//! - **Caches** (`cache.rs`): [`QueryCache`] keyed by metric id and
//!   configuration hash, and [`ResourceTypeCache`] keyed by the canonical
//!   type key of a resource. Both build each key at most once and never
//!   commit a failed build.
//!
//! - **Evaluator** (`evaluator.rs`): [`PolicyEvaluator`] ties catalog,
//!   caches and a [`ConfigurationSource`] together and reacts to metric
//!   change events.
//!
//! - **Sources** (`source.rs`): runtime overrides and a time-bounded
//!   configuration cache.
//!
//! - **Rules** (`rules.rs`, `operators.rs`): a declarative catalog loaded
//!   from YAML bundles, with the shared comparison operators.
//!
//! ## Crate Policy
//!
//! - Depends only on `vigil-core` internally.
//! - Evaluation is synchronous and performs no network I/O, so cache locks
//!   are never held across an await point.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod operators;
pub mod rules;
pub mod source;

pub use cache::{Lookup, QueryCache, ResourceTypeCache};
pub use catalog::{PolicyCatalog, PreparedQuery, QueryBindings};
pub use error::PolicyError;
pub use evaluator::{PolicyEvaluator, PolicyResult};
pub use operators::Operator;
pub use rules::{RuleBundle, RuleCatalog};
pub use source::{
    CachingConfigurationSource, ConfigurationOverrides, ConfigurationSource,
    DEFAULT_CONFIGURATION_TTL,
};
