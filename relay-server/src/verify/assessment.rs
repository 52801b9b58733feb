//! Acceptance policy over a verification result.

use super::recaptcha::VerificationResult;

/// Outcome of checking a verification result against the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// Token is valid, for the right form, and human enough
    Passed { score: f64 },
    /// The verification service rejected the token
    Failed,
    /// Token was minted for a different form context
    ActionMismatch { actual: Option<String> },
    /// Score below the threshold
    LowScore { score: f64 },
}

/// Apply the acceptance policy, in order: upstream success, action, score.
///
/// A verified result without a score is treated as scoring 0.0.
pub fn assess(result: &VerificationResult, expected_action: &str, threshold: f64) -> Assessment {
    if !result.success {
        return Assessment::Failed;
    }

    if result.action.as_deref() != Some(expected_action) {
        return Assessment::ActionMismatch {
            actual: result.action.clone(),
        };
    }

    let score = result.score.unwrap_or(0.0);
    if score < threshold {
        return Assessment::LowScore { score };
    }

    Assessment::Passed { score }
}
