//! Request extraction: submission body and caller IP.

use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header::CONTENT_TYPE, HeaderMap},
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::submission::{SubmissionForm, SubmissionRequest, SubmitError};

/// Submission body accepted either as JSON or as a urlencoded form.
///
/// `application/json` is parsed as JSON; anything else, including a missing
/// content type, is parsed as `application/x-www-form-urlencoded`. An empty
/// or whitespace-only body is an empty form under either content type, so it
/// ends up as a missing token rather than a parse failure.
#[derive(Debug)]
pub struct SubmissionBody(pub SubmissionRequest);

#[async_trait]
impl<S> FromRequest<S> for SubmissionBody
where
    S: Send + Sync,
{
    type Rejection = SubmitError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = is_json_content(req.headers());

        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            warn!(error = %e, "submission_body_unreadable");
            SubmitError::InvalidBody(e.to_string())
        })?;

        let form = if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!(is_json = is_json, "submission_body_empty");
            Ok(SubmissionForm::default())
        } else if is_json {
            serde_json::from_slice::<SubmissionForm>(&bytes)
        } else {
            serde_json::from_value::<SubmissionForm>(form_to_json(&bytes))
        }
        .map_err(|e| {
            warn!(error = %e, is_json = is_json, body_length = bytes.len(), "submission_body_invalid");
            SubmitError::InvalidBody(e.to_string())
        })?;

        Ok(Self(form.into()))
    }
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("application/json")
        })
        .unwrap_or(false)
}

/// Turn urlencoded pairs into a JSON object of strings.
///
/// The first occurrence of a repeated key wins.
fn form_to_json(body: &[u8]) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        map.entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    Value::Object(map)
}

/// Resolve the caller's IP address.
///
/// With `trusted_proxy_hops == 0` the socket peer is used. Otherwise the
/// `X-Forwarded-For` entry that many hops from the right is taken, falling
/// back to the peer when the header is absent or unparsable.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxy_hops: usize) -> Option<IpAddr> {
    let direct_ip = peer.map(|addr| addr.ip());

    if trusted_proxy_hops == 0 {
        return direct_ip;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|value| {
            let ips: Vec<&str> = value
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            let index = ips.len().checked_sub(trusted_proxy_hops)?;
            ips.get(index).and_then(|ip| ip.parse::<IpAddr>().ok())
        });

    if let Some(ip) = forwarded {
        debug!(extracted_ip = %ip, "client_ip_from_forwarded_for");
        return Some(ip);
    }

    direct_ip
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_form_to_json() {
        let value = form_to_json(b"recaptcha_token=abc&firstName=Ada+Lovelace&email=ada%40example.com&email=second");
        assert_eq!(value["recaptcha_token"], "abc");
        assert_eq!(value["firstName"], "Ada Lovelace");
        assert_eq!(value["email"], "ada@example.com");
    }

    #[test]
    fn test_form_to_json_empty() {
        assert_eq!(form_to_json(b""), Value::Object(Map::new()));
    }

    #[test]
    fn test_is_json_content() {
        let mut headers = HeaderMap::new();
        assert!(!is_json_content(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json_content(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        assert!(!is_json_content(&headers));
    }

    #[test]
    fn test_client_ip_direct() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        let peer: SocketAddr = "10.0.0.2:41000".parse().unwrap();

        // Forwarded header is ignored when no proxy is trusted.
        assert_eq!(client_ip(&headers, Some(peer), 0), Some(peer.ip()));
        assert_eq!(client_ip(&headers, None, 0), None);
    }

    #[test]
    fn test_client_ip_behind_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 203.0.113.9, 10.0.0.1"),
        );
        let peer: SocketAddr = "10.0.0.2:41000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), 1), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(client_ip(&headers, Some(peer), 2), Some("203.0.113.9".parse().unwrap()));
        // More hops than entries falls back to the peer.
        assert_eq!(client_ip(&headers, Some(peer), 5), Some(peer.ip()));
    }

    #[test]
    fn test_client_ip_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        let peer: SocketAddr = "10.0.0.2:41000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), 1), Some(peer.ip()));
    }
}
