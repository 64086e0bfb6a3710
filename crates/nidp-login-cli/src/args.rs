//! Command-line arguments and how they layer over the config file.

use anyhow::{Context, Result};
use clap::Parser;
use nidp_login::FlowConfig;
use std::path::PathBuf;

/// Obtain a SAML assertion from a NetIQ Access Manager IdP.
#[derive(Debug, Parser)]
#[command(name = "nidp-login", version, about)]
pub struct Args {
    /// JSON config file; flags override its values.
    #[arg(long, env = "NIDP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Full IdP login URL, e.g. https://login.example.com/nidp/app/login?id=AWS
    #[arg(long, env = "NIDP_URL")]
    pub url: Option<String>,

    /// MFA preference (Auto, Privileged).
    #[arg(long, env = "NIDP_MFA")]
    pub mfa: Option<String>,

    #[arg(long, short = 'u', env = "NIDP_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "NIDP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// One-time code for the first token page; prompted for when absent.
    #[arg(long, env = "NIDP_OTP", hide_env_values = true)]
    pub otp: Option<String>,

    /// Maximum IdP round-trips before giving up.
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print `{"saml_assertion": ...}` instead of the bare assertion.
    #[arg(long)]
    pub json: bool,

    /// Debug logging (RUST_LOG still wins).
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Args {
    /// Config file (or defaults) with flags applied on top, validated.
    pub fn flow_config(&self) -> Result<FlowConfig> {
        let mut config = match &self.config {
            Some(path) => FlowConfig::load(path)?,
            None => FlowConfig::default(),
        };

        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(mfa) = &self.mfa {
            config.mfa = mfa.clone();
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }

        config
            .validate()
            .context("no usable IdP configuration (set --url or --config)")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("nidp-login").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_only() {
        let args = parse(&[
            "--url",
            "https://login.example.com/nidp/app/login?id=AWS",
            "--mfa",
            "Privileged",
            "--max-steps",
            "5",
        ]);
        let config = args.flow_config().unwrap();
        assert_eq!(config.url, "https://login.example.com/nidp/app/login?id=AWS");
        assert_eq!(config.mfa, "Privileged");
        assert_eq!(config.max_steps, 5);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"url": "https://login.example.com/nidp/app/login", "max_steps": 7, "request_timeout_ms": 2000}}"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = parse(&["--config", &path, "--max-steps", "3"]);
        let config = args.flow_config().unwrap();
        assert_eq!(config.url, "https://login.example.com/nidp/app/login");
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.request_timeout_ms, 2000);
        assert_eq!(config.mfa, "Auto");
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let args = parse(&[]);
        assert!(args.flow_config().is_err());
    }
}
