//! Pull the actionable payload out of a classified page.
//!
//! Redirect and form extractors return `None` when their structure is absent;
//! that is a "not this kind" signal, not a fault. Only the SAML extractor
//! fails with an error, because by the time it runs the page has already
//! been classified as the terminal response.

use super::{select_within, Document};
use crate::error::FlowError;
use crate::form::{SubmittableForm, PASSWORD_FIELD, TOKEN_FIELD};
use regex::Regex;
use scraper::ElementRef;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Name of the hidden input carrying the assertion.
pub const SAML_RESPONSE_FIELD: &str = "SAMLResponse";

/// Return the base64 `SAMLResponse` value exactly as it appears in the page.
///
/// Fails with [`FlowError::MissingAssertion`] unless there is exactly one
/// `SAMLResponse` input with a non-empty value.
pub fn extract_saml_assertion(doc: &Document) -> Result<String, FlowError> {
    let inputs = doc.select(r#"input[name="SAMLResponse"]"#);
    if inputs.len() != 1 {
        return Err(FlowError::MissingAssertion);
    }
    inputs[0]
        .value()
        .attr("value")
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(FlowError::MissingAssertion)
}

/// The literal target of a `window.location.href = '...'` assignment.
pub fn extract_window_location_url(doc: &Document) -> Option<String> {
    let re = window_location_re();
    doc.scripts().find_map(|script| {
        re.captures_iter(&script)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().trim().to_string())
            .find(|url| !url.is_empty())
    })
}

/// The next resource named by a "get to content" page.
///
/// Looks at the content div first (link, `url` attribute, then iframe), then
/// at the body of a `getToContent` function, which must assign a URL literal
/// to `<frame>.location.href` either directly or through a variable.
/// The URL is returned verbatim; relative paths stay relative.
pub fn extract_content_url(doc: &Document) -> Option<String> {
    content_div_url(doc).or_else(|| content_script_url(doc))
}

/// The username/password form, with hidden fields pre-filled.
pub fn extract_password_form(doc: &Document) -> Option<SubmittableForm> {
    let form = find_form(doc, PASSWORD_FIELD, TOKEN_FIELD)?;
    form_from_element(doc, form)
}

/// The one-time token form, with hidden fields pre-filled.
pub fn extract_one_time_token_form(doc: &Document) -> Option<SubmittableForm> {
    let form = find_form(doc, TOKEN_FIELD, PASSWORD_FIELD)?;
    form_from_element(doc, form)
}

// ---- Private helpers --------------------------------------------------------

fn window_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"window\.location\.href\s*=\s*(?:'([^']*)'|"([^"]*)")"#)
            .expect("window.location regex is valid")
    })
}

fn get_to_content_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"function\s+getToContent\s*\([^)]*\)\s*\{")
            .expect("getToContent regex is valid")
    })
}

fn location_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\.location\.href\s*=\s*(?:'([^']*)'|"([^"]*)"|([A-Za-z_$][\w$]*))"#)
            .expect("location.href regex is valid")
    })
}

/// Content div without a form of its own, pointing somewhere navigable.
fn content_div_url(doc: &Document) -> Option<String> {
    doc.select("div#content")
        .into_iter()
        .filter(|div| select_within(*div, "form").is_empty())
        .find_map(|div| {
            let href = select_within(div, "a[href]")
                .into_iter()
                .filter_map(|a| a.value().attr("href"))
                .find(|h| is_navigable(h));
            let url_attr = || {
                div.value()
                    .attr("url")
                    .into_iter()
                    .chain(
                        select_within(div, "[url]")
                            .into_iter()
                            .filter_map(|el| el.value().attr("url")),
                    )
                    .find(|h| is_navigable(h))
            };
            let iframe = || {
                select_within(div, "iframe[src]")
                    .into_iter()
                    .filter_map(|f| f.value().attr("src"))
                    .find(|h| is_navigable(h))
            };
            href.or_else(url_attr)
                .or_else(iframe)
                .map(|h| h.trim().to_string())
        })
}

fn content_script_url(doc: &Document) -> Option<String> {
    doc.scripts().find_map(|script| {
        let body = get_to_content_body(&script)?;
        location_target(body)
    })
}

/// Body of `function getToContent(...) { ... }` without its braces.
/// An unterminated body runs to the end of the script.
fn get_to_content_body(script: &str) -> Option<&str> {
    let start = get_to_content_re().find(script)?.end();
    let mut depth = 1usize;
    for (i, c) in script[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&script[start..start + i]);
                }
            }
            _ => {}
        }
    }
    Some(&script[start..])
}

/// URL assigned to `*.location.href`, as a literal or via a variable
/// initialised with one.
fn location_target(body: &str) -> Option<String> {
    location_href_re().captures_iter(body).find_map(|caps| {
        let target = match (caps.get(1).or_else(|| caps.get(2)), caps.get(3)) {
            (Some(literal), _) => literal.as_str().to_string(),
            (None, Some(var)) => variable_literal(body, var.as_str())?,
            (None, None) => return None,
        };
        let target = target.trim();
        is_url_literal(target).then(|| target.to_string())
    })
}

fn variable_literal(body: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?:^|[^\w$.]){}\s*=\s*(?:'([^']*)'|"([^"]*)")"#,
        regex::escape(name)
    );
    let caps = Regex::new(&pattern).ok()?.captures(body)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

fn is_url_literal(s: &str) -> bool {
    s.len() > 1 && (s.starts_with('/') || s.starts_with("http://") || s.starts_with("https://"))
}

fn is_navigable(href: &str) -> bool {
    let h = href.trim();
    !h.is_empty() && !h.starts_with('#') && !h.to_ascii_lowercase().starts_with("javascript:")
}

/// First form holding an input named `required` and none named `forbidden`.
fn find_form<'a>(doc: &'a Document, required: &str, forbidden: &str) -> Option<ElementRef<'a>> {
    doc.select("form").into_iter().find(|form| {
        has_named_input(*form, required) && !has_named_input(*form, forbidden)
    })
}

fn has_named_input(form: ElementRef<'_>, name: &str) -> bool {
    select_within(form, "input[name]")
        .iter()
        .any(|input| input.value().attr("name") == Some(name))
}

fn form_from_element(doc: &Document, form: ElementRef<'_>) -> Option<SubmittableForm> {
    let attrs = form.value();

    let url = match attrs.attr("action").map(str::trim).filter(|a| !a.is_empty()) {
        Some(action) => doc.resolve(action),
        None => doc.url()?.to_string(),
    };
    if url.is_empty() {
        return None;
    }

    let method = attrs
        .attr("method")
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_ascii_uppercase())
        .unwrap_or_else(|| "POST".to_string());

    let mut fields = BTreeMap::new();
    for input in select_within(form, "input") {
        let el = input.value();
        let hidden = el
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden"));
        if !hidden {
            continue;
        }
        if let Some(name) = el.attr("name").filter(|n| !n.is_empty()) {
            fields.insert(name.to_string(), el.attr("value").unwrap_or("").to_string());
        }
    }

    Some(SubmittableForm {
        url,
        method,
        fields,
    })
}

// ---- Tests ------------------------------------------------------------------
