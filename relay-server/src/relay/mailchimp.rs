//! Mailchimp list member creation.
//!
//! Reference: https://mailchimp.com/developer/marketing/api/list-members/add-member-to-list/

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::MailchimpConfig;
use crate::submission::LeadFields;

/// Message used when the provider gives no usable detail.
pub const GENERIC_PROVIDER_ERROR: &str = "Mailchimp error.";

/// Merge fields sent with a new member. Absent values are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeFields {
    #[serde(rename = "FNAME", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "PHONE", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "PAGE_TYPE", skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,
    #[serde(rename = "PAGE_EXTRA", skip_serializing_if = "Option::is_none")]
    pub page_extra: Option<String>,
    #[serde(rename = "UTM_SOURCE", skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(rename = "UTM_MEDIUM", skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(rename = "UTM_CAMP", skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(rename = "UTM_CONT", skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(rename = "UTM_TERM", skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(rename = "GCLID", skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
}

impl From<&LeadFields> for MergeFields {
    fn from(lead: &LeadFields) -> Self {
        Self {
            first_name: lead.first_name.clone(),
            phone: lead.phone.clone(),
            page_type: lead.page_type.clone(),
            page_extra: lead.page_extra.clone(),
            utm_source: lead.utm_source.clone(),
            utm_medium: lead.utm_medium.clone(),
            utm_campaign: lead.utm_campaign.clone(),
            utm_content: lead.utm_content.clone(),
            utm_term: lead.utm_term.clone(),
            gclid: lead.gclid.clone(),
        }
    }
}

/// Body of the member creation call.
#[derive(Debug, Serialize)]
pub struct MemberRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<&'a str>,
    pub status: &'a str,
    pub merge_fields: MergeFields,
}

/// Provider answer to a member creation call.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Accepted,
    /// HTTP status >= 400, with the provider's detail or a generic message
    Rejected { status: u16, detail: String },
}

/// The provider could not be reached at all.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("mailing list request failed: {0}")]
    Transport(#[source] reqwest::Error),
}

/// Client for one Mailchimp audience.
#[derive(Clone)]
pub struct MailchimpRelay {
    client: Client,
    members_url: String,
    api_key: String,
    member_status: String,
    timeout: Duration,
}

impl MailchimpRelay {
    pub fn new(client: Client, config: &MailchimpConfig, timeout: Duration) -> Self {
        Self {
            client,
            members_url: format!("{}/lists/{}/members", config.api_base, config.list_id),
            api_key: config.api_key.clone(),
            member_status: config.member_status.clone(),
            timeout,
        }
    }

    /// Add a lead to the audience.
    pub async fn subscribe(&self, lead: &LeadFields) -> Result<RelayOutcome, RelayError> {
        let body = MemberRequest {
            email_address: lead.email.as_deref(),
            status: &self.member_status,
            merge_fields: MergeFields::from(lead),
        };

        info!(
            has_email = body.email_address.is_some(),
            email_length = body.email_address.map(str::len).unwrap_or(0),
            utm_source = lead.utm_source.as_deref(),
            page_type = lead.page_type.as_deref(),
            "mailchimp_relay_starting"
        );

        let response = self
            .client
            .post(&self.members_url)
            .timeout(self.timeout)
            .basic_auth("anystring", Some(&self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "mailchimp_relay_timeout"
                    );
                } else {
                    error!(error = %e, "mailchimp_relay_request_error");
                }
                RelayError::Transport(e)
            })?;

        let status = response.status().as_u16();
        if status < 400 {
            info!(status_code = status, "mailchimp_relay_accepted");
            return Ok(RelayOutcome::Accepted);
        }

        let detail = match response.text().await {
            Ok(text) => provider_detail(&text),
            Err(e) => {
                warn!(error = %e, "mailchimp_error_body_unreadable");
                GENERIC_PROVIDER_ERROR.to_string()
            }
        };

        warn!(status_code = status, detail = %detail, "mailchimp_relay_rejected");

        Ok(RelayOutcome::Rejected { status, detail })
    }
}

/// Pull the human-readable `detail` out of a Mailchimp problem document.
pub fn provider_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| GENERIC_PROVIDER_ERROR.to_string())
}
