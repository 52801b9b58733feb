//! reCAPTCHA v3 siteverify client.
//!
//! Reference: https://developers.google.com/recaptcha/docs/verify

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

/// Result returned by the verification endpoint.
///
/// Only lives for the duration of one request. It is echoed back to the
/// caller as `data` when verification fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,

    /// Bot score between 0.0 (bot) and 1.0 (human)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Action name embedded in the token on the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_ts: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Only present on failure
    #[serde(default, rename = "error-codes", skip_serializing_if = "Vec::is_empty")]
    pub error_codes: Vec<String>,
}

/// Failure to obtain a usable answer from the verification endpoint.
///
/// These are infrastructure problems, never a verdict about the token.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("verification endpoint returned HTTP {0}")]
    Status(u16),

    #[error("verification response was malformed: {0}")]
    Malformed(#[source] reqwest::Error),
}

/// Client for the siteverify endpoint.
#[derive(Clone)]
pub struct RecaptchaVerifier {
    client: Client,
    endpoint: Url,
    secret: String,
    timeout: Duration,
}

impl RecaptchaVerifier {
    pub fn new(client: Client, endpoint: Url, secret: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            secret,
            timeout,
        }
    }

    /// Verify a token on behalf of the caller at `remote_ip`.
    ///
    /// A well-formed negative answer (`success: false`) is returned as `Ok`;
    /// only transport, status and decoding problems are errors.
    pub async fn verify(
        &self,
        token: &str,
        remote_ip: Option<IpAddr>,
    ) -> Result<VerificationResult, VerifyError> {
        let remote_ip = remote_ip.map(|ip| ip.to_string());

        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip.as_deref() {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "recaptcha_verify_timeout"
                    );
                } else {
                    error!(error = %e, "recaptcha_verify_request_error");
                }
                VerifyError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status_code = status.as_u16(), "recaptcha_verify_bad_status");
            return Err(VerifyError::Status(status.as_u16()));
        }

        let result: VerificationResult = response.json().await.map_err(|e| {
            error!(error = %e, "recaptcha_verify_malformed_response");
            VerifyError::Malformed(e)
        })?;

        info!(
            success = result.success,
            score = result.score,
            action = result.action.as_deref(),
            hostname = result.hostname.as_deref(),
            "recaptcha_verify_complete"
        );

        Ok(result)
    }
}
