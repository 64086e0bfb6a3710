//! The login flow controller.
//!
//! Drives one IdP session from the resolved login URL to a `SAMLResponse`:
//! fetch a page, classify it, extract what it offers, build the next request,
//! repeat. One request is in flight at a time and the loop is bounded by
//! `max_steps`.

use crate::config::{FlowConfig, IdpAccount};
use crate::error::FlowError;
use crate::form::Secrets;
use crate::mfa::{resolve_login_url, MfaPreference};
use crate::page::{
    classify, extract_content_url, extract_one_time_token_form, extract_password_form,
    extract_saml_assertion, extract_window_location_url, matching_kinds, Document, PageKind,
};
use crate::transport::{HttpClient, HttpRequest, HttpResponse, Transport};
use base64::Engine as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

/// Monotonic counter for generating unique flow IDs.
static FLOW_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The terminal success value: the assertion exactly as the IdP embedded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    pub base64_assertion: String,
}

impl AssertionResult {
    /// Decode the assertion to its XML bytes. Embedded whitespace is ignored.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = self
            .base64_assertion
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD.decode(compact)
    }
}

/// Source of one-time codes when the IdP asks for one.
pub trait OneTimeCodePrompt: Send + Sync {
    fn one_time_code(&self) -> Result<String, FlowError>;
}

impl<F> OneTimeCodePrompt for F
where
    F: Fn() -> Result<String, FlowError> + Send + Sync,
{
    fn one_time_code(&self) -> Result<String, FlowError> {
        self()
    }
}

/// Prompt for non-interactive use: a token page without a supplied code fails.
pub struct NoPrompt;

impl OneTimeCodePrompt for NoPrompt {
    fn one_time_code(&self) -> Result<String, FlowError> {
        Err(FlowError::MissingSecret {
            field: "one-time code",
        })
    }
}

/// Mutable state of one flow, created at start and dropped when it ends.
#[derive(Debug, Clone)]
pub struct FlowState {
    /// Identifier used to correlate log lines of one flow.
    pub flow_id: String,
    /// URL of the last page received, or the login URL before the first fetch.
    pub current_url: String,
    /// The request the next iteration will issue.
    pub pending: HttpRequest,
    /// Requests issued so far.
    pub iteration: usize,
    /// MFA preference the login URL was resolved with.
    pub mfa: MfaPreference,
    /// Caller-supplied one-time code, consumed by the first token page.
    supplied_code: Option<String>,
    /// Set once username and password have been submitted.
    credentials_posted: bool,
}

impl FlowState {
    fn new(login_url: String, mfa: MfaPreference) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let counter = FLOW_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            flow_id: format!("flow-{ts}-{counter}"),
            current_url: login_url.clone(),
            pending: HttpRequest::get(login_url),
            iteration: 0,
            mfa,
            supplied_code: None,
            credentials_posted: false,
        }
    }
}

/// What one classified page leads to.
enum Step {
    Done(AssertionResult),
    Next(HttpRequest),
}

/// Runs login flows over a transport.
pub struct FlowController<T: Transport> {
    transport: T,
    config: FlowConfig,
}

impl<T: Transport> FlowController<T> {
    pub fn new(transport: T, config: FlowConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve the login URL and build the initial state. Issues no request.
    pub fn start(&self) -> Result<FlowState, FlowError> {
        let account = IdpAccount::from_url(&self.config.url)?;
        let mfa: MfaPreference = self.config.mfa.parse()?;
        let login_url = resolve_login_url(
            mfa.as_str(),
            &account.base_url,
            &account.default_path,
        )?;
        Ok(FlowState::new(login_url, mfa))
    }

    /// Run the flow to a terminal state.
    ///
    /// The username and password fill the password form. The one-time code in
    /// `secrets`, if any, answers the first token page; later token pages, or
    /// the first one when no code was supplied, ask `prompt`.
    pub async fn run(
        &mut self,
        secrets: &Secrets,
        prompt: &dyn OneTimeCodePrompt,
    ) -> Result<AssertionResult, FlowError> {
        let mut state = self.start()?;
        state.supplied_code = secrets.one_time_code.clone();
        info!(
            flow_id = %state.flow_id,
            mfa = %state.mfa,
            url = %state.current_url,
            "starting login flow"
        );

        loop {
            if state.iteration >= self.config.max_steps {
                warn!(
                    flow_id = %state.flow_id,
                    max_steps = self.config.max_steps,
                    "login flow exceeded step limit"
                );
                return Err(FlowError::MaxStepsExceeded {
                    max_steps: self.config.max_steps,
                });
            }
            state.iteration += 1;

            debug!(
                flow_id = %state.flow_id,
                iteration = state.iteration,
                method = %state.pending.method,
                url = %state.pending.url,
                "fetching"
            );
            let resp = self.transport.send(&state.pending).await?;
            state.current_url = resp.final_url.clone();

            match advance(&mut state, &resp, secrets, prompt)? {
                Step::Done(assertion) => {
                    info!(
                        flow_id = %state.flow_id,
                        steps = state.iteration,
                        "login flow produced SAML assertion"
                    );
                    return Ok(assertion);
                }
                Step::Next(request) => state.pending = request,
            }
        }
    }
}

/// Log in with a fresh [`HttpClient`] built from `config`.
pub async fn login(
    config: FlowConfig,
    secrets: &Secrets,
    prompt: &dyn OneTimeCodePrompt,
) -> Result<AssertionResult, FlowError> {
    let client = HttpClient::new(&config.user_agent, config.request_timeout_ms)?;
    FlowController::new(client, config).run(secrets, prompt).await
}

/// Classify one response and decide the next move.
///
/// Synchronous on purpose: the parsed document is not `Send` and must not
/// live across an await point.
fn advance(
    state: &mut FlowState,
    resp: &HttpResponse,
    secrets: &Secrets,
    prompt: &dyn OneTimeCodePrompt,
) -> Result<Step, FlowError> {
    let doc = Document::parse_with_url(&resp.body, &resp.final_url);
    let kind = classify(&doc);

    let overlaps = matching_kinds(&doc);
    if overlaps.len() > 1 {
        warn!(
            flow_id = %state.flow_id,
            url = %resp.final_url,
            kinds = ?overlaps,
            "page matches more than one signature; using {kind}"
        );
    }
    debug!(
        flow_id = %state.flow_id,
        iteration = state.iteration,
        %kind,
        status = resp.status,
        content_type = resp.header("content-type").unwrap_or("-"),
        url = %resp.final_url,
        "classified page"
    );

    match kind {
        PageKind::SamlResponse => {
            let base64_assertion = extract_saml_assertion(&doc)?;
            Ok(Step::Done(AssertionResult { base64_assertion }))
        }
        PageKind::WindowLocationRedirect => {
            let href = extract_window_location_url(&doc).ok_or(FlowError::ExtractionFailed { kind })?;
            Ok(Step::Next(HttpRequest::get(absolute_url(&doc, &href)?)))
        }
        PageKind::ContentRedirect => {
            let href = extract_content_url(&doc).ok_or(FlowError::ExtractionFailed { kind })?;
            Ok(Step::Next(HttpRequest::get(absolute_url(&doc, &href)?)))
        }
        PageKind::PasswordForm => {
            if state.credentials_posted {
                warn!(flow_id = %state.flow_id, url = %resp.final_url, "password form shown again");
                return Err(FlowError::CredentialsRejected {
                    url: resp.final_url.clone(),
                });
            }
            let form = extract_password_form(&doc).ok_or(FlowError::ExtractionFailed { kind })?;
            let credentials = Secrets {
                username: Some(required(&secrets.username, "username")?),
                password: Some(required(&secrets.password, "password")?),
                one_time_code: None,
            };
            let mut request = form.fill(&credentials).into_request();
            request.url = absolute_url(&doc, &request.url)?;
            state.credentials_posted = true;
            Ok(Step::Next(request))
        }
        PageKind::OneTimeTokenForm => {
            let form =
                extract_one_time_token_form(&doc).ok_or(FlowError::ExtractionFailed { kind })?;
            let code = match state.supplied_code.take() {
                Some(code) => code,
                None => prompt.one_time_code()?,
            };
            let token = Secrets {
                one_time_code: Some(code),
                ..Secrets::default()
            };
            let mut request = form.fill(&token).into_request();
            request.url = absolute_url(&doc, &request.url)?;
            Ok(Step::Next(request))
        }
        PageKind::Unrecognized => Err(FlowError::UnrecognizedPage {
            url: resp.final_url.clone(),
        }),
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, FlowError> {
    value.clone().ok_or(FlowError::MissingSecret { field })
}

/// Resolve `href` against the page and insist on an absolute http(s) URL.
fn absolute_url(doc: &Document, href: &str) -> Result<String, FlowError> {
    let resolved = doc.resolve(href);
    match Url::parse(&resolved) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url.to_string()),
        Ok(url) => Err(FlowError::InvalidUrl {
            url: resolved.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => Err(FlowError::InvalidUrl {
            url: resolved,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{PASSWORD_FIELD, TOKEN_FIELD, USERNAME_FIELD};
    use crate::transport::{HttpMethod, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    const SAML_RESPONSE: &str = include_str!("../tests/fixtures/saml_response.html");
    const GET_TO_CONTENT: &str = include_str!("../tests/fixtures/get_to_content.html");
    const WIN_LOC_HREF: &str = include_str!("../tests/fixtures/win_loc_href.html");
    const LOGIN_PASS: &str = include_str!("../tests/fixtures/idp_login_pass.html");
    const LOGIN_RSA: &str = include_str!("../tests/fixtures/idp_login_rsa.html");
    const ERROR_PAGE: &str = include_str!("../tests/fixtures/error_page.html");

    const BASE: &str = "https://login.authbridge.example.com";

    /// Replays canned pages and records every request it was sent.
    struct ScriptedTransport {
        pages: VecDeque<Result<(String, &'static str), TransportError>>,
        requests: Vec<HttpRequest>,
    }

    impl ScriptedTransport {
        fn new(pages: Vec<(&str, &'static str)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(path, body)| Ok((format!("{BASE}{path}"), body)))
                    .collect(),
                requests: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.push(request.clone());
            let (final_url, body) = self
                .pages
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))?;
            Ok(HttpResponse {
                status: 200,
                final_url,
                headers: Vec::new(),
                body: body.to_string(),
            })
        }
    }

    /// Always answers with the same redirect page.
    struct LoopingTransport {
        sent: usize,
    }

    #[async_trait]
    impl Transport for LoopingTransport {
        async fn send(&mut self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent += 1;
            Ok(HttpResponse {
                status: 200,
                final_url: format!("{BASE}/nidp/app/login"),
                headers: Vec::new(),
                body: WIN_LOC_HREF.to_string(),
            })
        }
    }

    /// Serves the same page for every request and counts POSTs.
    struct SamePageTransport {
        body: &'static str,
        posts: usize,
    }

    #[async_trait]
    impl Transport for SamePageTransport {
        async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            if request.method == HttpMethod::Post {
                self.posts += 1;
            }
            Ok(HttpResponse {
                status: 200,
                final_url: format!("{BASE}/nidp/app/login?sid=0"),
                headers: Vec::new(),
                body: self.body.to_string(),
            })
        }
    }

    fn config(mfa: &str) -> FlowConfig {
        let mut cfg = FlowConfig::for_url(format!("{BASE}/nidp/app/login?id=AWS"));
        cfg.mfa = mfa.to_string();
        cfg
    }

    fn field<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
        req.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn test_full_flow_with_rsa_step() {
        let transport = ScriptedTransport::new(vec![
            ("/nidp/app/login?id=AWS", GET_TO_CONTENT),
            ("/nidp/jsp/content.jsp?sid=0&option=credential&id=AWS", LOGIN_PASS),
            ("/nidp/app/login?sid=0&sid=0", LOGIN_RSA),
            ("/nidp/app/login?sid=11&sid=11", WIN_LOC_HREF),
            ("/nidp/saml2/idpsend?PID=STSPv8a5kc", SAML_RESPONSE),
        ]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let prompted = AtomicUsize::new(0);
        let prompt = || -> Result<String, FlowError> {
            prompted.fetch_add(1, Ordering::SeqCst);
            Ok("246810".to_string())
        };

        let result = controller
            .run(&Secrets::new("alice", "s3cret"), &prompt)
            .await
            .unwrap();
        assert!(result.base64_assertion.starts_with("PHNhbWxwOlJlc3BvbnNl"));
        assert_eq!(prompted.load(Ordering::SeqCst), 1);

        let reqs = &controller.transport().requests;
        assert_eq!(reqs.len(), 5);
        assert_eq!(reqs[0], HttpRequest::get(format!("{BASE}/nidp/app/login?id=AWS")));
        assert_eq!(
            reqs[1].url,
            format!("{BASE}/nidp/jsp/content.jsp?sid=0&option=credential&id=AWS")
        );

        assert_eq!(reqs[2].method, HttpMethod::Post);
        assert_eq!(reqs[2].url, format!("{BASE}/nidp/app/login?sid=0&sid=0"));
        assert_eq!(field(&reqs[2], USERNAME_FIELD), Some("alice"));
        assert_eq!(field(&reqs[2], PASSWORD_FIELD), Some("s3cret"));
        assert_eq!(field(&reqs[2], TOKEN_FIELD), None);

        assert_eq!(reqs[3].url, format!("{BASE}/nidp/app/login?sid=11&sid=11"));
        assert_eq!(field(&reqs[3], TOKEN_FIELD), Some("246810"));
        assert_eq!(field(&reqs[3], PASSWORD_FIELD), None);

        assert_eq!(reqs[4].method, HttpMethod::Get);
        assert_eq!(
            reqs[4].url,
            "https://login.authbridge.example.com/nidp/saml2/idpsend?PID=STSPv8a5kc"
        );
    }

    #[tokio::test]
    async fn test_privileged_mfa_starts_at_privileged_url() {
        let transport = ScriptedTransport::new(vec![("/nidp/app/login", SAML_RESPONSE)]);
        let mut controller = FlowController::new(transport, config("Privileged"));
        controller
            .run(&Secrets::new("alice", "pw"), &NoPrompt)
            .await
            .unwrap();
        assert_eq!(
            controller.transport().requests[0].url,
            format!("{BASE}/nidp/app/login?id=privacc&sid=0&option=credential")
        );
    }

    #[tokio::test]
    async fn test_unsupported_mfa_issues_no_request() {
        let transport = ScriptedTransport::new(vec![("/", SAML_RESPONSE)]);
        let mut controller = FlowController::new(transport, config("None"));
        let err = controller
            .run(&Secrets::new("alice", "pw"), &NoPrompt)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported MFA");
        assert!(controller.transport().requests.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_step_limit() {
        let mut cfg = config("Auto");
        cfg.max_steps = 4;
        let mut controller = FlowController::new(LoopingTransport { sent: 0 }, cfg);
        let err = controller
            .run(&Secrets::default(), &NoPrompt)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::MaxStepsExceeded { max_steps: 4 }));
        assert_eq!(controller.transport().sent, 4);
    }

    #[tokio::test]
    async fn test_unrecognized_page_is_terminal() {
        let transport = ScriptedTransport::new(vec![
            ("/nidp/app/login?id=AWS", ERROR_PAGE),
            ("/never", SAML_RESPONSE),
        ]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let err = controller
            .run(&Secrets::new("alice", "pw"), &NoPrompt)
            .await
            .unwrap_err();
        match err {
            FlowError::UnrecognizedPage { url } => {
                assert_eq!(url, format!("{BASE}/nidp/app/login?id=AWS"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(controller.transport().requests.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let mut transport = ScriptedTransport::new(vec![]);
        transport.pages.push_back(Err(TransportError::Status {
            status: 502,
            url: format!("{BASE}/nidp/app/login?id=AWS"),
        }));
        let mut controller = FlowController::new(transport, config("Auto"));
        let err = controller
            .run(&Secrets::new("alice", "pw"), &NoPrompt)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Transport(TransportError::Status { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn test_password_page_without_password_fails() {
        let transport = ScriptedTransport::new(vec![("/nidp/app/login?id=AWS", LOGIN_PASS)]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let secrets = Secrets {
            username: Some("alice".into()),
            ..Secrets::default()
        };
        let err = controller.run(&secrets, &NoPrompt).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingSecret { field: "password" }));
    }

    #[tokio::test]
    async fn test_rejected_password_is_posted_once() {
        let transport = SamePageTransport {
            body: LOGIN_PASS,
            posts: 0,
        };
        let mut controller = FlowController::new(transport, config("Auto"));
        let err = controller
            .run(&Secrets::new("alice", "wrong"), &NoPrompt)
            .await
            .unwrap_err();
        match err {
            FlowError::CredentialsRejected { url } => {
                assert_eq!(url, format!("{BASE}/nidp/app/login?sid=0"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(controller.transport().posts, 1);
    }

    #[tokio::test]
    async fn test_token_page_without_code_or_prompt_fails() {
        let transport = ScriptedTransport::new(vec![("/nidp/app/login?id=AWS", LOGIN_RSA)]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let err = controller
            .run(&Secrets::new("alice", "pw"), &NoPrompt)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::MissingSecret {
                field: "one-time code"
            }
        ));
    }

    #[tokio::test]
    async fn test_supplied_code_used_once_then_prompt() {
        let transport = ScriptedTransport::new(vec![
            ("/nidp/app/login?id=AWS", LOGIN_RSA),
            ("/nidp/app/login?sid=11&sid=11", LOGIN_RSA),
            ("/nidp/app/login?sid=11&sid=11", SAML_RESPONSE),
        ]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let prompt = || -> Result<String, FlowError> { Ok("999000".to_string()) };
        let secrets = Secrets::new("alice", "pw").with_one_time_code("111222");

        controller.run(&secrets, &prompt).await.unwrap();

        let reqs = &controller.transport().requests;
        assert_eq!(field(&reqs[1], TOKEN_FIELD), Some("111222"));
        assert_eq!(field(&reqs[2], TOKEN_FIELD), Some("999000"));
    }

    #[tokio::test]
    async fn test_saml_page_with_empty_value_is_missing_assertion() {
        const EMPTY: &str =
            r#"<html><form><input type="hidden" name="SAMLResponse" value=""></form></html>"#;
        let transport = ScriptedTransport::new(vec![("/nidp/app/login?id=AWS", EMPTY)]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let err = controller
            .run(&Secrets::default(), &NoPrompt)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingAssertion));
    }

    #[tokio::test]
    async fn test_redirect_to_non_http_scheme_is_rejected() {
        const JS: &str = r#"<script>window.location.href='mailto:help@example.com';</script>"#;
        let transport = ScriptedTransport::new(vec![("/nidp/app/login?id=AWS", JS)]);
        let mut controller = FlowController::new(transport, config("Auto"));
        let err = controller
            .run(&Secrets::default(), &NoPrompt)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidUrl { .. }));
    }

    #[test]
    fn test_start_resolves_initial_request() {
        let controller = FlowController::new(ScriptedTransport::new(vec![]), config("Auto"));
        let state = controller.start().unwrap();
        assert_eq!(state.iteration, 0);
        assert_eq!(state.mfa, MfaPreference::Auto);
        assert!(state.flow_id.starts_with("flow-"));
        assert_eq!(
            state.pending,
            HttpRequest::get(format!("{BASE}/nidp/app/login?id=AWS"))
        );
    }

    #[test]
    fn test_flow_ids_are_unique() {
        let controller = FlowController::new(ScriptedTransport::new(vec![]), config("Auto"));
        let a = controller.start().unwrap();
        let b = controller.start().unwrap();
        assert_ne!(a.flow_id, b.flow_id);
    }

    #[test]
    fn test_assertion_decode() {
        let result = AssertionResult {
            base64_assertion: "PHNhbWxwOlJlc3BvbnNl\nIC8+".to_string(),
        };
        assert_eq!(result.decode().unwrap(), b"<samlp:Response />");
    }
}
