//! Federated login against a NetIQ Access Manager IdP.
//!
//! The IdP walks the user through a tenant-specific sequence of HTML pages
//! (content redirects, a password form, an optional RSA token form, scripted
//! redirects) before handing back an auto-post page carrying the
//! `SAMLResponse`. This crate classifies each of those pages, extracts what
//! is needed to move on, and drives an HTTP session until it holds the
//! assertion or knows it never will.
//!
//! ```no_run
//! # async fn demo() -> Result<(), nidp_login::FlowError> {
//! use nidp_login::{login, FlowConfig, NoPrompt, Secrets};
//!
//! let config = FlowConfig::for_url("https://login.example.com/nidp/app/login?id=AWS");
//! let assertion = login(config, &Secrets::new("alice", "s3cret"), &NoPrompt).await?;
//! println!("{}", assertion.base64_assertion);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod flow;
pub mod form;
pub mod mfa;
pub mod page;
pub mod transport;

pub use config::{ConfigError, FlowConfig, IdpAccount, DEFAULT_MAX_STEPS};
pub use error::FlowError;
pub use flow::{login, AssertionResult, FlowController, FlowState, NoPrompt, OneTimeCodePrompt};
pub use form::{FieldNames, Secrets, SubmittableForm};
pub use mfa::{resolve_login_url, MfaPreference};
pub use page::{classify, Document, PageKind};
pub use transport::{HttpClient, HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
