//! HTTP endpoint handlers.
//!
//! Handlers stay thin: they extract the submission and caller IP, then hand
//! over to [`SubmissionHandler`], whose error type renders itself as the
//! JSON verdict.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::submission::{SubmissionHandler, SubmissionVerdict, SubmitError};
use crate::web::extract::{client_ip, SubmissionBody};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub submissions: SubmissionHandler,
}

impl AppState {
    pub fn new(config: Config, submissions: SubmissionHandler) -> Self {
        Self {
            config: Arc::new(config),
            submissions,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Form Submission
// =============================================================================

/// Contact form endpoint.
///
/// Responds 200 with the success verdict, or with the status and verdict of
/// whichever step rejected the submission.
pub async fn submit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    SubmissionBody(request): SubmissionBody,
) -> Result<Json<SubmissionVerdict>, SubmitError> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let ip = client_ip(&headers, peer, state.config.trusted_proxy_hops);

    let verdict = state.submissions.handle(request, ip).await?;

    Ok(Json(verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::{
        extract::Form,
        http::{header::AUTHORIZATION, StatusCode},
        routing::post,
        Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use url::Url;

    use crate::config::{MailchimpConfig, DEFAULT_ALLOWED_ORIGIN};
    use crate::web::router;

    const LIST_ID: &str = "list123";

    /// Stand-in for both the verification service and the mailing-list API.
    struct Stub {
        verify_status: StatusCode,
        verify_body: Value,
        list_status: StatusCode,
        list_body: Value,
        verify_hits: AtomicUsize,
        list_hits: AtomicUsize,
        verify_form: Mutex<Option<HashMap<String, String>>>,
        member: Mutex<Option<Value>>,
        list_auth: Mutex<Option<String>>,
    }

    impl Stub {
        fn verifying(body: Value) -> Self {
            Self {
                verify_status: StatusCode::OK,
                verify_body: body,
                list_status: StatusCode::OK,
                list_body: json!({"id": "member-1", "status": "subscribed"}),
                verify_hits: AtomicUsize::new(0),
                list_hits: AtomicUsize::new(0),
                verify_form: Mutex::new(None),
                member: Mutex::new(None),
                list_auth: Mutex::new(None),
            }
        }

        fn verify_status(mut self, status: StatusCode) -> Self {
            self.verify_status = status;
            self
        }

        fn list_response(mut self, status: StatusCode, body: Value) -> Self {
            self.list_status = status;
            self.list_body = body;
            self
        }
    }

    async fn stub_verify(
        State(stub): State<Arc<Stub>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        stub.verify_hits.fetch_add(1, Ordering::SeqCst);
        *stub.verify_form.lock().unwrap() = Some(form);
        (stub.verify_status, Json(stub.verify_body.clone()))
    }

    async fn stub_members(
        State(stub): State<Arc<Stub>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        stub.list_hits.fetch_add(1, Ordering::SeqCst);
        *stub.member.lock().unwrap() = Some(body);
        *stub.list_auth.lock().unwrap() = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        (stub.list_status, Json(stub.list_body.clone()))
    }

    async fn spawn(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });
        addr
    }

    fn test_config(upstream: SocketAddr, relay: bool) -> Config {
        Config {
            port: 0,
            recaptcha_secret: "test-secret".to_string(),
            recaptcha_verify_url: Url::parse(&format!("http://{upstream}/siteverify")).unwrap(),
            score_threshold: 0.5,
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            mailchimp: relay.then(|| MailchimpConfig {
                api_key: "test-key-us1".to_string(),
                list_id: LIST_ID.to_string(),
                api_base: format!("http://{upstream}/3.0"),
                member_status: "subscribed".to_string(),
            }),
            request_timeout_ms: 2000,
            handler_timeout_ms: 5000,
            trusted_proxy_hops: 0,
        }
    }

    struct Harness {
        app: SocketAddr,
        stub: Arc<Stub>,
        client: reqwest::Client,
    }

    impl Harness {
        async fn start(stub: Stub, relay: bool) -> Self {
            Self::start_with(stub, relay, |_| {}).await
        }

        async fn start_with(stub: Stub, relay: bool, adjust: impl FnOnce(&mut Config)) -> Self {
            let stub = Arc::new(stub);
            let upstream = spawn(
                Router::new()
                    .route("/siteverify", post(stub_verify))
                    .route(&format!("/3.0/lists/{LIST_ID}/members"), post(stub_members))
                    .with_state(Arc::clone(&stub)),
            )
            .await;

            let mut config = test_config(upstream, relay);
            adjust(&mut config);
            let submissions = SubmissionHandler::from_config(&config).unwrap();
            let app = spawn(router(AppState::new(config, submissions))).await;

            Self {
                app,
                stub,
                client: reqwest::Client::new(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.app, path)
        }

        async fn post_form(&self, fields: &[(&str, &str)]) -> (u16, Value) {
            let response = self
                .client
                .post(self.url("/api/submit"))
                .form(fields)
                .send()
                .await
                .unwrap();
            let status = response.status().as_u16();
            (status, response.json().await.unwrap())
        }

        async fn post_json(&self, body: Value) -> (u16, Value) {
            let response = self
                .client
                .post(self.url("/api/submit"))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = response.status().as_u16();
            (status, response.json().await.unwrap())
        }

        fn verify_hits(&self) -> usize {
            self.stub.verify_hits.load(Ordering::SeqCst)
        }

        fn list_hits(&self) -> usize {
            self.stub.list_hits.load(Ordering::SeqCst)
        }
    }

    fn human() -> Value {
        json!({"success": true, "action": "submit", "score": 0.9, "hostname": "kh-brokers-main.webflow.io"})
    }

    #[tokio::test]
    async fn test_health() {
        let h = Harness::start(Stub::verifying(human()), false).await;
        let body: Value = h
            .client
            .get(h.url("/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_outbound_calls() {
        let h = Harness::start(Stub::verifying(human()), true).await;

        let (status, body) = h.post_form(&[("email", "ada@example.com")]).await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({"success": false, "message": "Missing reCAPTCHA token"}));

        let (status, _) = h.post_form(&[("recaptcha_token", "")]).await;
        assert_eq!(status, 400);

        let (status, body) = h.post_json(json!({"recaptcha_action": "submit"})).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "Missing reCAPTCHA token");

        assert_eq!(h.verify_hits(), 0);
        assert_eq!(h.list_hits(), 0);
    }

    #[tokio::test]
    async fn test_empty_body_is_missing_token() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let response = h.client.post(h.url("/api/submit")).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Missing reCAPTCHA token");

        for empty in ["", "  \n"] {
            let response = h
                .client
                .post(h.url("/api/submit"))
                .header("content-type", "application/json")
                .body(empty)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 400);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body, json!({"success": false, "message": "Missing reCAPTCHA token"}));
        }

        assert_eq!(h.verify_hits(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_body() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let response = h
            .client
            .post(h.url("/api/submit"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"success": false, "message": "Invalid request body"}));
        assert_eq!(h.verify_hits(), 0);
    }

    #[tokio::test]
    async fn test_verified_without_relay() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let (status, body) = h
            .post_form(&[("recaptcha_token", "valid"), ("recaptcha_action", "submit")])
            .await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({"success": true, "message": "reCAPTCHA verified successfully.", "score": 0.9})
        );
        assert_eq!(h.verify_hits(), 1);
        assert_eq!(h.list_hits(), 0);
    }

    #[tokio::test]
    async fn test_verification_request_contents() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let (status, _) = h.post_json(json!({"recaptcha_token": "valid"})).await;
        assert_eq!(status, 200);

        let form = h.stub.verify_form.lock().unwrap().clone().unwrap();
        assert_eq!(form.get("secret").map(String::as_str), Some("test-secret"));
        assert_eq!(form.get("response").map(String::as_str), Some("valid"));
        assert_eq!(form.get("remoteip").map(String::as_str), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_verification_failed() {
        let stub = Stub::verifying(json!({"success": false, "error-codes": ["invalid-input-response"]}));
        let h = Harness::start(stub, true).await;

        let (status, body) = h.post_form(&[("recaptcha_token", "bogus")]).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "reCAPTCHA failed");
        assert_eq!(body["data"]["error-codes"], json!(["invalid-input-response"]));
        assert_eq!(h.list_hits(), 0);
    }

    #[tokio::test]
    async fn test_action_mismatch() {
        let stub = Stub::verifying(json!({"success": true, "action": "login", "score": 0.9}));
        let h = Harness::start(stub, false).await;

        let (status, body) = h.post_form(&[("recaptcha_token", "valid")]).await;

        assert_eq!(status, 400);
        assert_eq!(body, json!({"success": false, "message": "reCAPTCHA action mismatch"}));
    }

    #[tokio::test]
    async fn test_custom_action() {
        let stub = Stub::verifying(json!({"success": true, "action": "contact", "score": 0.7}));
        let h = Harness::start(stub, false).await;

        let (status, body) = h
            .post_form(&[("recaptcha_token", "valid"), ("recaptcha_action", "contact")])
            .await;

        assert_eq!(status, 200);
        assert_eq!(body["score"], 0.7);
    }

    #[tokio::test]
    async fn test_low_score() {
        let stub = Stub::verifying(json!({"success": true, "action": "submit", "score": 0.2}));
        let h = Harness::start(stub, true).await;

        let (status, body) = h.post_form(&[("recaptcha_token", "valid")]).await;

        assert_eq!(status, 403);
        assert_eq!(
            body,
            json!({
                "success": false,
                "message": "Low reCAPTCHA score (0.2). Possible bot.",
                "score": 0.2
            })
        );
        assert_eq!(h.list_hits(), 0);
    }

    #[tokio::test]
    async fn test_verification_service_error() {
        let stub = Stub::verifying(json!({"error": "unavailable"}))
            .verify_status(StatusCode::SERVICE_UNAVAILABLE);
        let h = Harness::start(stub, false).await;

        let (status, body) = h.post_form(&[("recaptcha_token", "valid")]).await;

        assert_eq!(status, 500);
        assert_eq!(
            body,
            json!({"success": false, "message": "Server error verifying reCAPTCHA"})
        );
    }

    #[tokio::test]
    async fn test_verification_malformed_response() {
        let h = Harness::start(Stub::verifying(json!("not an object")), false).await;

        let (status, body) = h.post_form(&[("recaptcha_token", "valid")]).await;

        assert_eq!(status, 500);
        assert_eq!(body["message"], "Server error verifying reCAPTCHA");
    }

    #[tokio::test]
    async fn test_relay_success() {
        let h = Harness::start(Stub::verifying(human()), true).await;

        let (status, body) = h
            .post_form(&[
                ("recaptcha_token", "valid"),
                ("firstName", "Ada"),
                ("email", "ada@example.com"),
                ("phone", "555-0100"),
                ("page_type", "landing"),
                ("page_extra", "hero"),
                ("utm_source", "google"),
                ("utm_campaign", "spring"),
                ("gclid", "xyz"),
            ])
            .await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({"success": true, "message": "reCAPTCHA verified successfully.", "score": 0.9})
        );
        assert_eq!(h.list_hits(), 1);

        let member = h.stub.member.lock().unwrap().clone().unwrap();
        assert_eq!(
            member,
            json!({
                "email_address": "ada@example.com",
                "status": "subscribed",
                "merge_fields": {
                    "FNAME": "Ada",
                    "PHONE": "555-0100",
                    "PAGE_TYPE": "landing",
                    "PAGE_EXTRA": "hero",
                    "UTM_SOURCE": "google",
                    "UTM_CAMP": "spring",
                    "GCLID": "xyz"
                }
            })
        );

        let auth = h.stub.list_auth.lock().unwrap().clone().unwrap();
        assert!(auth.starts_with("Basic "));
    }

    #[tokio::test]
    async fn test_relay_rejection_surfaces_detail() {
        let stub = Stub::verifying(human())
            .list_response(StatusCode::UNPROCESSABLE_ENTITY, json!({"detail": "Invalid email"}));
        let h = Harness::start(stub, true).await;

        let (status, body) = h
            .post_form(&[("recaptcha_token", "valid"), ("email", "nope")])
            .await;

        assert_eq!(status, 400);
        assert_eq!(body, json!({"success": false, "message": "Invalid email"}));
    }

    #[tokio::test]
    async fn test_relay_rejection_without_detail() {
        let stub = Stub::verifying(human())
            .list_response(StatusCode::INTERNAL_SERVER_ERROR, json!({"title": "Internal"}));
        let h = Harness::start(stub, true).await;

        let (status, body) = h.post_form(&[("recaptcha_token", "valid")]).await;

        assert_eq!(status, 400);
        assert_eq!(body, json!({"success": false, "message": "Mailchimp error."}));
    }

    #[tokio::test]
    async fn test_preflight_echoes_allowed_origin() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let response = h
            .client
            .request(reqwest::Method::OPTIONS, h.url("/api/submit"))
            .header("Origin", DEFAULT_ALLOWED_ORIGIN)
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], DEFAULT_ALLOWED_ORIGIN);
        assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
    }

    #[tokio::test]
    async fn test_bare_options() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let response = h
            .client
            .request(reqwest::Method::OPTIONS, h.url("/api/submit"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            DEFAULT_ALLOWED_ORIGIN
        );
        assert_eq!(h.verify_hits(), 0);
    }

    #[tokio::test]
    async fn test_cors_headers_on_submission() {
        let h = Harness::start(Stub::verifying(human()), false).await;

        let allowed = h
            .client
            .post(h.url("/api/submit"))
            .header("Origin", DEFAULT_ALLOWED_ORIGIN)
            .form(&[("recaptcha_token", "valid")])
            .send()
            .await
            .unwrap();
        assert_eq!(allowed.status().as_u16(), 200);
        assert_eq!(
            allowed.headers()["access-control-allow-origin"],
            DEFAULT_ALLOWED_ORIGIN
        );

        let foreign = h
            .client
            .post(h.url("/api/submit"))
            .header("Origin", "https://evil.example")
            .form(&[("recaptcha_token", "valid")])
            .send()
            .await
            .unwrap();
        assert!(foreign.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_wildcard_allow_lists() {
        let h = Harness::start_with(Stub::verifying(human()), false, |config| {
            config.allowed_origins = vec!["*".to_string()];
            config.allowed_headers = vec!["*".to_string()];
        })
        .await;

        let submitted = h
            .client
            .post(h.url("/api/submit"))
            .header("Origin", "https://partner.example")
            .form(&[("recaptcha_token", "valid")])
            .send()
            .await
            .unwrap();
        assert_eq!(submitted.status().as_u16(), 200);
        assert_eq!(submitted.headers()["access-control-allow-origin"], "*");

        let preflight = h
            .client
            .request(reqwest::Method::OPTIONS, h.url("/api/submit"))
            .header("Origin", "https://partner.example")
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status().as_u16(), 200);
        assert_eq!(
            preflight.headers()["access-control-allow-origin"],
            "https://partner.example"
        );
        assert_eq!(preflight.headers()["access-control-allow-headers"], "*");
    }

    #[tokio::test]
    async fn test_json_lead_fields_accept_numbers() {
        let h = Harness::start(Stub::verifying(human()), true).await;

        let (status, body) = h
            .post_json(json!({
                "recaptcha_token": "valid",
                "email": "ada@example.com",
                "phone": 5551234,
                "gclid": null
            }))
            .await;
        assert_eq!(status, 200, "{body}");

        let member = h.stub.member.lock().unwrap().clone().unwrap();
        assert_eq!(member["merge_fields"], json!({"PHONE": "5551234"}));
    }
}
