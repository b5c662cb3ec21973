//! # Assessment Error
//!
//! Failures of the assessment pipeline and their mapping onto the
//! caller-facing [`AssessEvidenceResponse`].
//!
//! | Variant          | Effect on the evidence                           |
//! |------------------|--------------------------------------------------|
//! | `Validation`     | rejected immediately, `Failed`                   |
//! | `AlreadyWaiting` | rejected immediately, `Failed`                   |
//! | `Evaluation`     | whole result set dropped, `Failed`               |
//! | `Connectivity`   | reported to hooks; the evidence stays `Assessed` |

use thiserror::Error;
use vigil_core::{AssessEvidenceResponse, ValidationError};
use vigil_policy::PolicyError;

/// Errors raised while assessing an evidence.
#[derive(Error, Debug)]
pub enum AssessmentError {
    /// The evidence violates the evidence contract.
    #[error("invalid evidence: {0}")]
    Validation(#[from] ValidationError),

    /// An evidence with the same id is already waiting for related
    /// resources.
    #[error("evidence {evidence_id} is already waiting for related resources")]
    AlreadyWaiting {
        /// The duplicated evidence id.
        evidence_id: String,
    },

    /// The policy engine failed for this evidence.
    #[error("could not evaluate evidence: {0}")]
    Evaluation(#[from] PolicyError),

    /// A downstream stream could not be reached.
    #[error("downstream stream unavailable: {0}")]
    Connectivity(#[from] SinkError),
}

impl AssessmentError {
    /// The response returned to the submitter.
    pub fn into_response(self) -> AssessEvidenceResponse {
        AssessEvidenceResponse::failed(self.to_string())
    }
}

/// Errors of a downstream stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Establishing the stream failed.
    #[error("could not connect to {stream}: {reason}")]
    Connect {
        /// Stream name.
        stream: String,
        /// Why the connection failed.
        reason: String,
    },

    /// Sending on an established stream failed.
    #[error("could not send on {stream}: {reason}")]
    Send {
        /// Stream name.
        stream: String,
        /// Why the send failed.
        reason: String,
    },

    /// The receiving side is gone.
    #[error("stream {stream} is closed")]
    Closed {
        /// Stream name.
        stream: String,
    },
}

/// A result hook reported a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("result hook failed: {0}")]
pub struct HookError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::AssessmentStatus;

    #[test]
    fn failed_response_carries_reason() {
        let response = AssessmentError::from(ValidationError::MissingToolId).into_response();
        assert_eq!(response.status, AssessmentStatus::Failed);
        assert_eq!(
            response.message.as_deref(),
            Some("invalid evidence: tool id is missing")
        );
    }

    #[test]
    fn already_waiting_names_the_evidence() {
        let err = AssessmentError::AlreadyWaiting {
            evidence_id: "e-1".into(),
        };
        assert!(err.to_string().contains("e-1"));
    }
}
