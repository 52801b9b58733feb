//! Forwarding of validated leads to the mailing-list provider.

pub mod mailchimp;

pub use mailchimp::{provider_detail, MailchimpRelay, MemberRequest, MergeFields, RelayError, RelayOutcome};
