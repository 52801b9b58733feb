//! Bot-score token verification.
//!
//! ```text
//! token → RecaptchaVerifier::verify() → VerificationResult → assess() → Assessment
//! ```
//!
//! The verifier only talks to the upstream service; deciding whether a
//! result is good enough lives in [`assessment`] so it can be tested
//! without a network.

pub mod assessment;
pub mod recaptcha;

pub use assessment::{assess, Assessment};
pub use recaptcha::{RecaptchaVerifier, VerificationResult, VerifyError};
