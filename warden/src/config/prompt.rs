//! Interactive prompts for fields no other layer supplied.

use super::field::ConfigField;
use console::Term;
use std::io::IsTerminal;
use warden_shared::{WardenError, WardenResult};

/// Asks the operator for a field value.
pub trait Prompter: Send + Sync {
    /// `Ok(None)` when the operator left the answer blank.
    fn ask(&self, field: ConfigField, question: &str) -> WardenResult<Option<String>>;
}

/// Prompts on the controlling terminal; secrets are read without echo.
pub struct ConsolePrompter {
    term: Term,
}

impl ConsolePrompter {
    /// `Some` only when both stdin and stderr are terminals.
    pub fn attended() -> Option<Self> {
        let term = Term::stderr();
        if term.is_term() && std::io::stdin().is_terminal() {
            Some(Self { term })
        } else {
            None
        }
    }
}

impl Prompter for ConsolePrompter {
    fn ask(&self, field: ConfigField, question: &str) -> WardenResult<Option<String>> {
        let prompt = format!("{}: ", console::style(question).bold());
        self.term
            .write_str(&prompt)
            .map_err(|e| WardenError::Internal(format!("failed to write prompt: {}", e)))?;

        let answer = if field.is_secret() {
            self.term.read_secure_line()
        } else {
            self.term.read_line()
        }
        .map_err(|e| WardenError::Internal(format!("failed to read {}: {}", field, e)))?;

        let answer = answer.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }
}
