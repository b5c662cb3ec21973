//! # vigil-assessment — Assessment Orchestration
//!
//! Admits evidence from collection tools, holds back evidence whose related
//! resources have not arrived yet, evaluates it with `vigil-policy` and
//! delivers the results to in-process hooks and downstream streams.
//!
//! ## Architecture
//!
//! - **Service** (`service.rs`): [`AssessmentService`], the admission and
//!   assessment pipeline, single-shot and streaming.
//!
//! - **Dependency resolution** (`store.rs`, `waiting.rs`): the latest
//!   evidence per resource id, and the registry of waiting requests that
//!   are told about every newly admitted resource.
//!
//! - **Delivery** (`hooks.rs`, `sink.rs`): isolated result hooks and
//!   lazily (re)connected streams.
//!
//! - **Configuration** (`config.rs`): environment-driven settings.
//!
//! ## Crate Policy
//!
//! - Locks are `parking_lot` and never held across an await point; the one
//!   lock that is (a stream's sender) is a `tokio::sync::Mutex`.
//! - Every failure reaches the submitter as a `Failed` response, the hooks,
//!   or both. Nothing is silently dropped.

pub mod config;
pub mod error;
pub mod hooks;
pub mod service;
pub mod sink;
pub mod store;
pub mod waiting;

pub use config::{AssessmentConfig, ConfigError};
pub use error::{AssessmentError, HookError, SinkError};
pub use hooks::{HookRegistry, ResultHook};
pub use service::{AssessmentService, AssessmentServiceBuilder, EVIDENCE_STREAM, RESULTS_STREAM};
pub use sink::{ChannelConnector, LazyStream, StreamConnector, StreamSender};
pub use store::{AdmittedEvidence, EvidenceStore};
pub use waiting::{Pending, WaitingRegistry, WaitingRequest};
