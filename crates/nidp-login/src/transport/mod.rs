//! HTTP transport used by the flow controller.
//!
//! The controller only sees the [`Transport`] trait. [`HttpClient`] is the
//! production implementation; tests substitute scripted transports.

mod http_client;

pub use http_client::{HttpClient, DEFAULT_TIMEOUT_MS};

use async_trait::async_trait;
use std::fmt;

/// Methods the flow can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Map a form's `method` attribute. Anything other than GET posts.
    pub fn from_form_method(method: &str) -> Self {
        if method.trim().eq_ignore_ascii_case("GET") {
            HttpMethod::Get
        } else {
            HttpMethod::Post
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The next request of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Url-encoded body fields; empty for GET.
    pub form: Vec<(String, String)>,
}

impl HttpRequest {
    /// A bodiless GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            form: Vec::new(),
        }
    }

    /// A url-encoded POST.
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            form,
        }
    }
}

/// What came back from the IdP after redirects were followed.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code of the final response.
    pub status: u16,
    /// URL of the final response, after redirects.
    pub final_url: String,
    /// Response headers (lower-cased names).
    pub headers: Vec<(String, String)>,
    /// Decoded response body.
    pub body: String,
}

impl HttpResponse {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Failures raised by a transport. The flow passes these through untouched.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be built or sent.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The IdP answered with a non-2xx status.
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    /// The HTTP client itself could not be constructed.
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),

    /// Anything else a custom transport wants to report.
    #[error("{0}")]
    Other(String),
}

/// One request in, one response out, sharing session state across calls.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}
