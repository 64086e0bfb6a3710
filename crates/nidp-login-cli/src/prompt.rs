//! Terminal prompts for usernames, passwords and one-time codes.

use nidp_login::{FlowError, OneTimeCodePrompt};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use std::borrow::Cow;

/// Renders every typed character as `*`.
struct MaskingHelper;

impl Completer for MaskingHelper {
    type Candidate = String;
}
impl Hinter for MaskingHelper {
    type Hint = String;
}
impl Validator for MaskingHelper {}
impl Helper for MaskingHelper {}

impl Highlighter for MaskingHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// Read one visible line.
pub fn read_line(prompt: &str) -> Result<String, ReadlineError> {
    let mut rl = rustyline::DefaultEditor::new()?;
    let line = rl.readline(prompt)?;
    Ok(line.trim().to_string())
}

/// Read one line without echoing it.
pub fn read_secret(prompt: &str) -> Result<String, ReadlineError> {
    let mut rl: Editor<MaskingHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(MaskingHelper));
    rl.readline(prompt)
}

/// Asks on the terminal whenever the IdP shows a token page.
pub struct TerminalPrompt;

impl OneTimeCodePrompt for TerminalPrompt {
    fn one_time_code(&self) -> Result<String, FlowError> {
        let code = read_secret("RSA SecurID passcode: ").map_err(|e| FlowError::Prompt(e.to_string()))?;
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(FlowError::MissingSecret {
                field: "one-time code",
            });
        }
        Ok(code)
    }
}
