//! `reqwest`-backed transport with a private cookie jar.
//!
//! Each `HttpClient` owns its own cookie store, so two flows never see each
//! other's IdP session. Redirects are followed by reqwest; the flow only ever
//! sees the final page.

use super::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Maximum HTTP redirects followed within a single request.
const MAX_REDIRECTS: usize = 10;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// HTTP client for one login attempt.
pub struct HttpClient {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpClient {
    /// Build a client with a fresh cookie store.
    pub fn new(user_agent: &str, timeout_ms: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self { client, timeout_ms })
    }

    /// GET a URL.
    pub async fn get(&self, url: &str, timeout_ms: u64) -> Result<HttpResponse, TransportError> {
        let builder = self
            .client
            .get(url)
            .timeout(Duration::from_millis(timeout_ms));
        self.execute(url, builder).await
    }

    /// POST url-encoded form data, with optional extra headers.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .post(url)
            .form(form)
            .timeout(Duration::from_millis(timeout_ms));
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        self.execute(url, builder).await
    }

    async fn execute(
        &self,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<HttpResponse, TransportError> {
        let resp = builder.send().await.map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_lowercase(),
                    String::from_utf8_lossy(v.as_bytes()).to_string(),
                )
            })
            .collect();

        let body = resp.text().await.map_err(|source| TransportError::Request {
            url: final_url.clone(),
            source,
        })?;

        debug!(status = status.as_u16(), url = %final_url, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status: status.as_u16(),
            final_url,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        match request.method {
            HttpMethod::Get => self.get(&request.url, self.timeout_ms).await,
            HttpMethod::Post => {
                self.post_form(&request.url, &request.form, &[], self.timeout_ms)
                    .await
            }
        }
    }
}
