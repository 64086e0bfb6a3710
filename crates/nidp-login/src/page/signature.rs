//! Page signatures: cheap structural fingerprints of each known IdP page.
//!
//! Classification never fails. Signatures are checked in a fixed priority
//! order because one document can carry more than one weak signature; the
//! first match wins and anything else is [`PageKind::Unrecognized`].

use super::extract::{
    extract_content_url, extract_one_time_token_form, extract_password_form,
    extract_window_location_url,
};
use super::{Document, PageKind};

/// Signature checks, highest priority first.
const SIGNATURES: &[(PageKind, fn(&Document) -> bool)] = &[
    (PageKind::SamlResponse, is_saml_response),
    (PageKind::WindowLocationRedirect, is_window_location_redirect),
    (PageKind::ContentRedirect, is_content_redirect),
    (PageKind::PasswordForm, is_password_form),
    (PageKind::OneTimeTokenForm, is_one_time_token_form),
];

/// Assign exactly one [`PageKind`] to a document.
pub fn classify(doc: &Document) -> PageKind {
    SIGNATURES
        .iter()
        .find(|(_, matches)| matches(doc))
        .map(|(kind, _)| *kind)
        .unwrap_or(PageKind::Unrecognized)
}

/// Every signature the document satisfies, in priority order.
///
/// More than one entry means the signatures overlap for this page; the
/// controller logs it so the signatures can be tightened.
pub fn matching_kinds(doc: &Document) -> Vec<PageKind> {
    SIGNATURES
        .iter()
        .filter(|(_, matches)| matches(doc))
        .map(|(kind, _)| *kind)
        .collect()
}

/// A `SAMLResponse` input is present.
pub fn is_saml_response(doc: &Document) -> bool {
    !doc.select(r#"input[name="SAMLResponse"]"#).is_empty()
}

/// A script assigns a literal to `window.location.href`.
pub fn is_window_location_redirect(doc: &Document) -> bool {
    extract_window_location_url(doc).is_some()
}

/// A "get to content" script or content div names the next resource.
pub fn is_content_redirect(doc: &Document) -> bool {
    extract_content_url(doc).is_some()
}

/// A form with a password input and no token input.
pub fn is_password_form(doc: &Document) -> bool {
    extract_password_form(doc).is_some()
}

/// A form with a token input and no password input.
pub fn is_one_time_token_form(doc: &Document) -> bool {
    extract_one_time_token_form(doc).is_some()
}
