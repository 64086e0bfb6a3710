//! Parsed IdP pages and their classification.
//!
//! A [`Document`] lives for exactly one step of the flow: it is parsed from a
//! response body, classified by [`signature::classify`], handed to the
//! matching extractor in [`extract`], and dropped.

pub mod extract;
pub mod signature;

use scraper::{ElementRef, Html, Selector};
use std::fmt;
use url::Url;

pub use extract::{
    extract_content_url, extract_one_time_token_form, extract_password_form,
    extract_saml_assertion, extract_window_location_url,
};
pub use signature::{classify, matching_kinds};

/// The known page shapes, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Auto-post page carrying the `SAMLResponse`.
    SamlResponse,
    /// Script assigning `window.location.href`.
    WindowLocationRedirect,
    /// "Get to content" page pointing at the next IdP resource.
    ContentRedirect,
    /// Username and password form.
    PasswordForm,
    /// One-time token (RSA) form.
    OneTimeTokenForm,
    /// Nothing we know.
    Unrecognized,
}

impl PageKind {
    /// Stable name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::SamlResponse => "saml_response",
            PageKind::WindowLocationRedirect => "window_location_redirect",
            PageKind::ContentRedirect => "content_redirect",
            PageKind::PasswordForm => "password_form",
            PageKind::OneTimeTokenForm => "one_time_token_form",
            PageKind::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed response body, plus the URL it came from when known.
pub struct Document {
    html: Html,
    url: Option<Url>,
}

impl Document {
    /// Parse a document with no known location. Relative URLs stay relative.
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
            url: None,
        }
    }

    /// Parse a document fetched from `url`.
    ///
    /// An unparsable `url` is treated as unknown rather than an error.
    pub fn parse_with_url(body: &str, url: &str) -> Self {
        Self {
            html: Html::parse_document(body),
            url: Url::parse(url).ok(),
        }
    }

    /// The URL this document was fetched from, if known.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Resolve `href` against the document URL.
    ///
    /// Absolute URLs and documents without a location return `href` as-is.
    pub fn resolve(&self, href: &str) -> String {
        match &self.url {
            Some(base) => base
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        }
    }

    /// All elements matching a CSS selector, in document order.
    ///
    /// An invalid selector matches nothing.
    pub(crate) fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(css) {
            Ok(sel) => self.html.select(&sel).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Text of every inline `<script>` element.
    pub(crate) fn scripts(&self) -> impl Iterator<Item = String> + '_ {
        self.select("script")
            .into_iter()
            .map(|el| el.text().collect::<String>())
    }
}

/// Descendants of `el` matching `css`. An invalid selector matches nothing.
pub(crate) fn select_within<'a>(el: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => el.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}
