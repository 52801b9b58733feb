//! Contact form submission pipeline.
//!
//! ## Processing Flow
//!
//! ```text
//! SubmissionRequest → token check → verify → assess → [relay] → SubmissionVerdict
//! ```
//!
//! Every step either hands over to the next one or ends the request with a
//! [`SubmitError`]. Outbound calls are strictly sequential: the relay is only
//! attempted once verification has passed.

pub mod error;
pub mod types;

use std::net::IpAddr;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::relay::{MailchimpRelay, RelayOutcome};
use crate::verify::{assess, Assessment, RecaptchaVerifier};

pub use error::SubmitError;
pub use types::{LeadFields, SubmissionForm, SubmissionRequest, SubmissionVerdict, DEFAULT_ACTION};

/// Runs the verification and relay steps for one submission.
///
/// Holds no per-request state; clones share the underlying HTTP client.
#[derive(Clone)]
pub struct SubmissionHandler {
    verifier: RecaptchaVerifier,
    relay: Option<MailchimpRelay>,
    score_threshold: f64,
}

impl SubmissionHandler {
    pub fn new(verifier: RecaptchaVerifier, relay: Option<MailchimpRelay>, score_threshold: f64) -> Self {
        Self {
            verifier,
            relay,
            score_threshold,
        }
    }

    /// Build the handler and its shared HTTP client from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(16)
            .connect_timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        let verifier = RecaptchaVerifier::new(
            client.clone(),
            config.recaptcha_verify_url.clone(),
            config.recaptcha_secret.clone(),
            config.request_timeout(),
        );

        let relay = config
            .mailchimp
            .as_ref()
            .map(|mc| MailchimpRelay::new(client, mc, config.request_timeout()));

        Ok(Self::new(verifier, relay, config.score_threshold))
    }

    /// Process one submission.
    ///
    /// Returns the success verdict, or the error describing which step
    /// rejected it.
    pub async fn handle(
        &self,
        request: SubmissionRequest,
        client_ip: Option<IpAddr>,
    ) -> Result<SubmissionVerdict, SubmitError> {
        info!(
            action = %request.action,
            has_token = request.token.is_some(),
            has_email = request.lead.email.is_some(),
            client_ip = ?client_ip,
            "submission_received"
        );

        let Some(token) = request.token.as_deref() else {
            warn!("submission_missing_token");
            return Err(SubmitError::MissingToken);
        };

        let result = self.verifier.verify(token, client_ip).await?;

        let score = match assess(&result, &request.action, self.score_threshold) {
            Assessment::Passed { score } => score,
            Assessment::Failed => {
                warn!(error_codes = ?result.error_codes, "recaptcha_failed");
                return Err(SubmitError::VerificationFailed(Box::new(result)));
            }
            Assessment::ActionMismatch { actual } => {
                warn!(
                    expected = %request.action,
                    actual = ?actual,
                    "recaptcha_action_mismatch"
                );
                return Err(SubmitError::ActionMismatch {
                    expected: request.action,
                    actual,
                });
            }
            Assessment::LowScore { score } => {
                warn!(
                    score = score,
                    threshold = self.score_threshold,
                    "recaptcha_low_score"
                );
                return Err(SubmitError::LowScore {
                    score,
                    threshold: self.score_threshold,
                });
            }
        };

        info!(score = score, "recaptcha_success");

        if let Some(relay) = &self.relay {
            match relay.subscribe(&request.lead).await? {
                RelayOutcome::Accepted => info!("mailchimp_relay_complete"),
                RelayOutcome::Rejected { status, detail } => {
                    warn!(status_code = status, "mailchimp_relay_failed");
                    return Err(SubmitError::RelayRejected { status, detail });
                }
            }
        }

        Ok(SubmissionVerdict::verified(score))
    }
}
