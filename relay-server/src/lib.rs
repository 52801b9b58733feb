//! FormRelay - contact form backend for the marketing site.
//!
//! A single endpoint receives the site's contact form, checks the reCAPTCHA
//! v3 token, optionally subscribes the lead to a Mailchimp audience, and
//! answers with a uniform JSON verdict.
//!
//! ## Architecture
//!
//! ```text
//! Browser → web (axum) → submission → verify (reCAPTCHA) → relay (Mailchimp)
//! ```
//!
//! No state outlives a request; the only shared data is the read-only
//! [`Config`] loaded at startup.

pub mod config;
pub mod relay;
pub mod submission;
pub mod verify;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use submission::{SubmissionHandler, SubmissionRequest, SubmissionVerdict, SubmitError};
pub use web::AppState;
