//! Webhook intake: signature verification and payload normalization.
//!
//! The intake pipeline runs signature verification first (cheap, rejects
//! forged requests before any parsing), then normalizes the body into a
//! typed [`parser::WebhookEnvelope`].

pub mod parser;
pub mod signature;

pub use parser::{EventAction, ParseError, WebhookEnvelope, parse_envelope};
pub use signature::{compute_signature, format_signature_header, verify_request, verify_signature};
