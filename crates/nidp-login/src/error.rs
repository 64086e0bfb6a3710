//! Error types for the login flow.

use crate::page::PageKind;
use crate::transport::TransportError;

/// Terminal failure of a login flow.
///
/// Every variant ends the current flow. Callers may restart from the
/// beginning; nothing here is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The requested MFA preference has no known login URL.
    #[error("Unsupported MFA")]
    UnsupportedMfa {
        /// The preference string as supplied.
        preference: String,
    },

    /// A login URL or redirect target could not be parsed.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The IdP returned a page that matches no known signature.
    #[error("unrecognized page at {url}")]
    UnrecognizedPage { url: String },

    /// The page was classified as a SAML response but the payload is missing.
    #[error("unable to locate SAMLResponse value")]
    MissingAssertion,

    /// The page matched a signature but the extractor found nothing usable.
    #[error("page classified as {kind} but nothing could be extracted")]
    ExtractionFailed { kind: PageKind },

    /// The IdP showed the password form again after credentials were posted.
    #[error("credentials rejected by IdP at {url}")]
    CredentialsRejected { url: String },

    /// The flow did not reach a terminal page within `max_steps` requests.
    #[error("login flow exceeded {max_steps} steps")]
    MaxStepsExceeded { max_steps: usize },

    /// A secret the current page needs was not supplied.
    #[error("missing {field}")]
    MissingSecret { field: &'static str },

    /// The interactive prompt for a secret failed.
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Passed through from the HTTP transport unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
