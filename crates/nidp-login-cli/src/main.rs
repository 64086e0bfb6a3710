//! `nidp-login`: log in to a NetIQ IdP and print the SAML assertion.
//!
//! Logs go to stderr; stdout carries only the assertion so it can be piped
//! into whatever exchanges it for cloud credentials.

mod args;
mod prompt;

use anyhow::{Context, Result};
use args::Args;
use clap::Parser;
use nidp_login::{login, Secrets};
use prompt::TerminalPrompt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.flow_config()?;
    let secrets = gather_secrets(&args)?;

    info!(url = %config.url, mfa = %config.mfa, "logging in");
    let assertion = login(config, &secrets, &TerminalPrompt)
        .await
        .context("login failed")?;

    if args.json {
        let out = serde_json::json!({ "saml_assertion": assertion.base64_assertion });
        println!("{out}");
    } else {
        println!("{}", assertion.base64_assertion);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "nidp_login=debug,nidp_login_cli=debug"
    } else {
        "nidp_login=info,nidp_login_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Flags and env first, then the terminal.
fn gather_secrets(args: &Args) -> Result<Secrets> {
    let username = match &args.username {
        Some(u) => u.clone(),
        None => prompt::read_line("Username: ").context("reading username")?,
    };
    let password = match &args.password {
        Some(p) => p.clone(),
        None => prompt::read_secret("Password: ").context("reading password")?,
    };

    let mut secrets = Secrets::new(username, password);
    if let Some(code) = &args.otp {
        secrets = secrets.with_one_time_code(code.clone());
    }
    Ok(secrets)
}
