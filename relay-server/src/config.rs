//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup into a read-only [`Config`] that the
//! web layer shares behind an `Arc`. Optional values that fail to parse fall
//! back to their defaults with a warning; missing credentials and an
//! out-of-range score threshold are hard errors.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Google reCAPTCHA v3 verification endpoint.
pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Origin of the marketing site the form is embedded in.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://kh-brokers-main.webflow.io";

/// Scores strictly below this are treated as bots.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;

/// Errors raised while loading [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is required")]
    Missing(&'static str),

    #[error("environment variable `{name}` is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Mailchimp audience the relay step subscribes leads to.
#[derive(Debug, Clone)]
pub struct MailchimpConfig {
    /// API key in `<key>-<datacenter>` form
    pub api_key: String,

    /// Audience (list) identifier
    pub list_id: String,

    /// API root without trailing slash, e.g. `https://us21.api.mailchimp.com/3.0`
    pub api_base: String,

    /// Member status sent on creation (`subscribed` or `pending`)
    pub member_status: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Shared secret sent to the verification service
    pub recaptcha_secret: String,

    /// Verification endpoint
    pub recaptcha_verify_url: Url,

    /// Minimum accepted score (0.0 - 1.0)
    pub score_threshold: f64,

    /// CORS origin allow-list
    pub allowed_origins: Vec<String>,

    /// CORS allowed request headers
    pub allowed_headers: Vec<String>,

    /// Mailing-list relay; `None` disables the relay step
    pub mailchimp: Option<MailchimpConfig>,

    /// Timeout for each outbound HTTP call in milliseconds
    pub request_timeout_ms: u64,

    /// Timeout for a whole inbound request in milliseconds
    pub handler_timeout_ms: u64,

    /// Reverse proxies in front of the server whose `X-Forwarded-For` entries are trusted
    pub trusted_proxy_hops: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let recaptcha_secret = get("RECAPTCHA_SECRET").ok_or(ConfigError::Missing("RECAPTCHA_SECRET"))?;

        let verify_url = get("RECAPTCHA_VERIFY_URL").unwrap_or_else(|| DEFAULT_VERIFY_URL.to_string());
        let recaptcha_verify_url = Url::parse(&verify_url).map_err(|e| ConfigError::Invalid {
            name: "RECAPTCHA_VERIFY_URL",
            reason: e.to_string(),
        })?;

        let score_threshold = match get("RECAPTCHA_SCORE_THRESHOLD") {
            None => DEFAULT_SCORE_THRESHOLD,
            Some(raw) => match raw.parse::<f64>() {
                Ok(t) if (0.0..=1.0).contains(&t) => t,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "RECAPTCHA_SCORE_THRESHOLD",
                        reason: format!("expected a number between 0 and 1, got {raw}"),
                    })
                }
            },
        };

        let allowed_origins = parse_csv(get("ALLOWED_ORIGINS").as_deref())
            .unwrap_or_else(|| vec![DEFAULT_ALLOWED_ORIGIN.to_string()]);

        let allowed_headers = parse_csv(get("ALLOWED_HEADERS").as_deref())
            .unwrap_or_else(|| vec!["Content-Type".to_string()]);

        let mailchimp = mailchimp_from(&get)?;

        Ok(Config {
            port: parse_or(&get, "PORT", 3000),
            recaptcha_secret,
            recaptcha_verify_url,
            score_threshold,
            allowed_origins,
            allowed_headers,
            mailchimp,
            request_timeout_ms: parse_timeout_or(&get, "REQUEST_TIMEOUT_MS", 8000),
            handler_timeout_ms: parse_timeout_or(&get, "HANDLER_TIMEOUT_MS", 15000),
            trusted_proxy_hops: parse_or(&get, "TRUSTED_PROXY_HOPS", 0),
        })
    }

    /// Whether validated leads are forwarded to the mailing list.
    pub fn relay_enabled(&self) -> bool {
        self.mailchimp.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

/// Resolve the relay section.
///
/// `MAILCHIMP_ENABLED` wins when set; otherwise the relay is on exactly when
/// both the API key and the list id are present.
fn mailchimp_from<G>(get: &G) -> Result<Option<MailchimpConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let api_key = get("MAILCHIMP_API_KEY");
    let list_id = get("MAILCHIMP_LIST_ID");

    let enabled = match get("MAILCHIMP_ENABLED") {
        Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
            name: "MAILCHIMP_ENABLED",
            reason: format!("expected a boolean, got {raw}"),
        })?,
        None => api_key.is_some() && list_id.is_some(),
    };

    if !enabled {
        return Ok(None);
    }

    let api_key = api_key.ok_or(ConfigError::Missing("MAILCHIMP_API_KEY"))?;
    let list_id = list_id.ok_or(ConfigError::Missing("MAILCHIMP_LIST_ID"))?;

    let api_base = match get("MAILCHIMP_API_BASE") {
        Some(base) => base,
        None => {
            let dc = datacenter(&api_key).ok_or_else(|| ConfigError::Invalid {
                name: "MAILCHIMP_API_KEY",
                reason: "missing datacenter suffix (expected <key>-<dc>)".to_string(),
            })?;
            format!("https://{dc}.api.mailchimp.com/3.0")
        }
    };

    Url::parse(&api_base).map_err(|e| ConfigError::Invalid {
        name: "MAILCHIMP_API_BASE",
        reason: e.to_string(),
    })?;

    Ok(Some(MailchimpConfig {
        api_key,
        list_id,
        api_base: api_base.trim_end_matches('/').to_string(),
        member_status: get("MAILCHIMP_MEMBER_STATUS").unwrap_or_else(|| "subscribed".to_string()),
    }))
}

/// Extract the datacenter from a `<key>-<dc>` API key.
fn datacenter(api_key: &str) -> Option<&str> {
    api_key
        .rsplit_once('-')
        .map(|(_, dc)| dc)
        .filter(|dc| !dc.is_empty() && dc.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Parse a value, falling back to `default` with a warning when it is malformed.
fn parse_or<G, T>(get: &G, name: &str, default: T) -> T
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "invalid_config_value_using_default");
            default
        }),
    }
}

/// Like [`parse_or`], but a zero timeout is also replaced by the default.
fn parse_timeout_or<G>(get: &G, name: &str, default: u64) -> u64
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, name, default) {
        0 => {
            warn!(env_var = name, value = 0, "invalid_config_value_using_default");
            default
        }
        ms => ms,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    })
    .filter(|items| !items.is_empty())
}
