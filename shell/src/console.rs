//! Terminal input through rustyline.

use crate::completion::CompletionScopes;
use crate::interpreter::{LineReader, ReadLine};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

/// Completes words from the current context's scopes.
#[derive(Debug, Default)]
pub struct ShellHelper {
    scopes: CompletionScopes,
}

impl Completer for ShellHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.scopes.complete(line, pos))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

/// [`LineReader`] over an interactive terminal, with history and tab
/// completion.
pub struct Console {
    editor: Editor<ShellHelper, DefaultHistory>,
}

impl Console {
    pub fn new() -> rustyline::Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(ShellHelper::default()));
        Ok(Self { editor })
    }
}

impl LineReader for Console {
    fn read_line(&mut self, prompt: &str) -> ReadLine {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(err) = self.editor.add_history_entry(line.as_str()) {
                        tracing::warn!(%err, "history entry dropped");
                    }
                }
                ReadLine::Line(line)
            }
            Err(ReadlineError::Interrupted) => ReadLine::Interrupted,
            Err(ReadlineError::Eof) => ReadLine::Eof,
            Err(err) => ReadLine::Error(err.to_string()),
        }
    }

    fn set_completion(&mut self, scopes: &CompletionScopes) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.scopes.clone_from(scopes);
        }
    }
}
