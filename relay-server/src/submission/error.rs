//! Terminal outcomes of a rejected submission.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::types::SubmissionVerdict;
use crate::relay::RelayError;
use crate::verify::{VerificationResult, VerifyError};

/// Everything that ends a submission without a success verdict.
///
/// Each variant knows its HTTP status and the verdict shown to the caller.
/// Transport variants keep their source for logs but never expose it.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("missing reCAPTCHA token")]
    MissingToken,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("reCAPTCHA verification failed")]
    VerificationFailed(Box<VerificationResult>),

    #[error("reCAPTCHA action mismatch: expected {expected}, got {actual:?}")]
    ActionMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("reCAPTCHA score {score} below threshold {threshold}")]
    LowScore { score: f64, threshold: f64 },

    #[error("mailing list rejected the lead (HTTP {status}): {detail}")]
    RelayRejected { status: u16, detail: String },

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl SubmitError {
    pub fn status(&self) -> StatusCode {
        match self {
            SubmitError::MissingToken
            | SubmitError::InvalidBody(_)
            | SubmitError::VerificationFailed(_)
            | SubmitError::ActionMismatch { .. }
            | SubmitError::RelayRejected { .. } => StatusCode::BAD_REQUEST,
            SubmitError::LowScore { .. } => StatusCode::FORBIDDEN,
            SubmitError::Verify(_) | SubmitError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn verdict(&self) -> SubmissionVerdict {
        match self {
            SubmitError::MissingToken => SubmissionVerdict::rejected("Missing reCAPTCHA token"),
            SubmitError::InvalidBody(_) => SubmissionVerdict::rejected("Invalid request body"),
            SubmitError::VerificationFailed(result) => SubmissionVerdict {
                data: Some(result.as_ref().clone()),
                ..SubmissionVerdict::rejected("reCAPTCHA failed")
            },
            SubmitError::ActionMismatch { .. } => {
                SubmissionVerdict::rejected("reCAPTCHA action mismatch")
            }
            SubmitError::LowScore { score, .. } => SubmissionVerdict {
                score: Some(*score),
                ..SubmissionVerdict::rejected(format!(
                    "Low reCAPTCHA score ({score}). Possible bot."
                ))
            },
            SubmitError::RelayRejected { detail, .. } => SubmissionVerdict::rejected(detail.clone()),
            SubmitError::Verify(_) => SubmissionVerdict::rejected("Server error verifying reCAPTCHA"),
            SubmitError::Relay(_) => {
                SubmissionVerdict::rejected("Server error submitting to mailing list")
            }
        }
    }
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.verdict())).into_response()
    }
}
