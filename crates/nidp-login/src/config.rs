//! Flow configuration.
//!
//! A `FlowConfig` can be read from a JSON file and then overridden field by
//! field by the caller (the CLI applies its flags on top).

use crate::error::FlowError;
use crate::mfa::MfaPreference;
use crate::transport::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default bound on IdP round-trips per login.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Settings for one login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Full IdP login URL; split into base URL and default path at start.
    pub url: String,
    /// MFA preference name, e.g. `"Auto"` or `"Privileged"`.
    pub mfa: String,
    /// Maximum number of requests before giving up.
    pub max_steps: usize,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// User agent sent to the IdP.
    pub user_agent: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            mfa: MfaPreference::Auto.as_str().to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("nidp-login/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Errors reading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl FlowConfig {
    /// A default configuration for `url`.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Check the settings that would otherwise fail late.
    ///
    /// The MFA preference is not checked here; it is resolved, and rejected,
    /// when the flow starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be at least 1".into(),
            ));
        }
        IdpAccount::from_url(&self.url).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

/// A login URL split into the IdP origin and the account's own path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpAccount {
    /// `scheme://host[:port]`
    pub base_url: String,
    /// Path plus query, e.g. `/nidp/app/login?id=AWS`.
    pub default_path: String,
}

impl IdpAccount {
    /// Split a full login URL.
    pub fn from_url(raw: &str) -> Result<Self, FlowError> {
        let invalid = |reason: &str| FlowError::InvalidUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

        let base_url = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };
        let default_path = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };

        Ok(Self {
            base_url,
            default_path,
        })
    }
}
