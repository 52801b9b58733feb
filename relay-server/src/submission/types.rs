//! Request and verdict shapes for one form submission.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::verify::VerificationResult;

/// Action assumed when the form does not send one.
pub const DEFAULT_ACTION: &str = "submit";

/// Lead data collected by the form.
///
/// All fields are optional and only checked for presence. Empty strings
/// are normalized to `None` when the request is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFields {
    pub first_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub page_type: Option<String>,
    pub page_extra: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    pub gclid: Option<String>,
}

/// A parsed submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    /// Bot-score token; `None` when absent or empty
    pub token: Option<String>,

    /// Form context the token must have been minted for
    pub action: String,

    pub lead: LeadFields,
}

/// Flat wire shape of `POST /api/submit`, shared by the form-encoded and JSON bodies.
///
/// Lead fields also take JSON numbers and booleans, which are kept as their
/// text. Browser form libraries often serialize phone numbers that way.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionForm {
    #[serde(default)]
    pub recaptcha_token: Option<String>,
    #[serde(default)]
    pub recaptcha_action: Option<String>,
    #[serde(
        default,
        rename = "firstName",
        alias = "first_name",
        deserialize_with = "lenient_string"
    )]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub page_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub page_extra: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub utm_source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub utm_medium: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub utm_campaign: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub utm_content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub utm_term: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gclid: Option<String>,
}

/// Accept a string, number, boolean or null where a text field is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::invalid_type(
            de::Unexpected::Other(json_kind(&other)),
            &"a string, number or boolean",
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        _ => "value",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<SubmissionForm> for SubmissionRequest {
    fn from(form: SubmissionForm) -> Self {
        Self {
            token: non_empty(form.recaptcha_token),
            action: non_empty(form.recaptcha_action).unwrap_or_else(|| DEFAULT_ACTION.to_string()),
            lead: LeadFields {
                first_name: non_empty(form.first_name),
                phone: non_empty(form.phone),
                email: non_empty(form.email),
                page_type: non_empty(form.page_type),
                page_extra: non_empty(form.page_extra),
                utm_source: non_empty(form.utm_source),
                utm_medium: non_empty(form.utm_medium),
                utm_campaign: non_empty(form.utm_campaign),
                utm_content: non_empty(form.utm_content),
                utm_term: non_empty(form.utm_term),
                gclid: non_empty(form.gclid),
            },
        }
    }
}

/// The only thing the caller ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionVerdict {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Raw verification result, only on "reCAPTCHA failed"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<VerificationResult>,
}

impl SubmissionVerdict {
    pub fn verified(score: f64) -> Self {
        Self {
            success: true,
            message: "reCAPTCHA verified successfully.".to_string(),
            score: Some(score),
            data: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            score: None,
            data: None,
        }
    }
}
