//! MFA preference resolution.
//!
//! The IdP selects its authentication contract from the login URL, so the MFA
//! choice is settled once, before the first request, by picking the URL the
//! flow starts from.

use crate::error::FlowError;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Login path of the privileged-access contract.
pub const PRIVILEGED_LOGIN_PATH: &str = "/nidp/app/login?id=privacc&sid=0&option=credential";

/// A supported MFA preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MfaPreference {
    /// Let the IdP pick; start from the account's own login path.
    #[default]
    Auto,
    /// Privileged-access contract.
    Privileged,
}

impl MfaPreference {
    /// Every supported preference, in display order.
    pub const ALL: &'static [MfaPreference] = &[MfaPreference::Auto, MfaPreference::Privileged];

    /// Canonical name as accepted in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaPreference::Auto => "Auto",
            MfaPreference::Privileged => "Privileged",
        }
    }

    /// Fixed login path for this preference, or `None` to keep the default.
    fn login_path(&self) -> Option<&'static str> {
        match self {
            MfaPreference::Auto => None,
            MfaPreference::Privileged => Some(PRIVILEGED_LOGIN_PATH),
        }
    }

    /// Build the initial login URL for this preference.
    pub fn login_url(&self, base_url: &str, default_path: &str) -> String {
        let path = self.login_path().unwrap_or(default_path);
        format!("{base_url}{path}")
    }
}

impl fmt::Display for MfaPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MfaPreference {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MfaPreference::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FlowError::UnsupportedMfa {
                preference: s.to_string(),
            })
    }
}

/// Resolve the URL a flow starts from.
///
/// `Auto` keeps `base_url + default_path`; other preferences substitute their
/// own path. Unknown preferences fail with [`FlowError::UnsupportedMfa`].
pub fn resolve_login_url(
    preference: &str,
    base_url: &str,
    default_path: &str,
) -> Result<String, FlowError> {
    let mfa: MfaPreference = preference.parse()?;
    let url = mfa.login_url(base_url, default_path);
    debug!(mfa = %mfa, url = %url, "resolved login url");
    Ok(url)
}
