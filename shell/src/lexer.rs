//! Command-line tokenizer.
//!
//! Input is fed one character at a time through an [`Fsm`] whose table
//! encodes shell-style quoting, escaping and `$NAME` expansion. Completed
//! statements are queued as [`LexEvent`]s; the caller drains the queue
//! between characters, so a statement can run (and change variables) before
//! the rest of the line is tokenized.
//!
//! A `$NAME` reference takes the longest run of name characters, so
//! `a$NOPEb` looks up `NOPEb`; use `a${NOPE}b` to end the name early.

use crate::env::{self, Variables};
use crate::fsm::{ANY, Fsm, Machine, State, SyntaxError, Transition};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

/// Lexer states.
pub mod state {
    use crate::fsm::State;

    pub const BARE: State = 0;
    pub const ESCAPE: State = 1;
    pub const SINGLE_QUOTE: State = 2;
    pub const DOUBLE_QUOTE: State = 3;
    pub const QUOTE_IN_DOUBLE: State = 4;
    pub const ESCAPE_IN_DOUBLE: State = 5;
    pub const VAR_START: State = 6;
    pub const VAR_NAME: State = 7;
    pub const VAR_BRACED: State = 8;
    pub const VAR_START_IN_DOUBLE: State = 9;
    pub const VAR_NAME_IN_DOUBLE: State = 10;
    pub const VAR_BRACED_IN_DOUBLE: State = 11;
}

use state::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("syntax error near {symbol:?}")]
    Syntax { symbol: char, stack: Vec<char> },
    #[error("${{{name}}}: {reason}")]
    Expansion { name: String, reason: String },
    #[error("unexpected end of input")]
    Unterminated,
}

impl From<SyntaxError> for LexError {
    fn from(err: SyntaxError) -> Self {
        LexError::Syntax {
            symbol: err.symbol,
            stack: err.stack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexEvent {
    /// A terminated, non-empty statement.
    Statement(Vec<String>),
    /// A recoverable problem found while tokenizing.
    Error(LexError),
}

/// Accumulator the transition actions work on.
struct Words {
    arg: String,
    varname: String,
    args: Vec<String>,
    events: VecDeque<LexEvent>,
    vars: Rc<dyn Variables>,
}

impl Words {
    fn flush_word(&mut self) {
        self.args.push(std::mem::take(&mut self.arg));
    }

    fn substitute(&mut self, name: String) {
        match self.vars.lookup(&name) {
            Ok(Some(value)) => self.arg.push_str(&value),
            Ok(None) => {}
            Err(e) => self.events.push_back(LexEvent::Error(LexError::Expansion {
                name,
                reason: e.to_string(),
            })),
        }
    }

    fn clear(&mut self) {
        self.arg.clear();
        self.varname.clear();
        self.args.clear();
    }
}

fn add_text(w: &mut Words, c: char, _m: &mut Machine) {
    w.arg.push(c);
}

fn word_break(w: &mut Words, _c: char, _m: &mut Machine) {
    if !w.arg.is_empty() {
        w.flush_word();
    }
}

fn end_statement(w: &mut Words, c: char, m: &mut Machine) {
    word_break(w, c, m);
    if !w.args.is_empty() {
        let argv = std::mem::take(&mut w.args);
        w.events.push_back(LexEvent::Statement(argv));
    }
}

fn close_quote(w: &mut Words, _c: char, _m: &mut Machine) {
    w.flush_word();
}

fn escape(w: &mut Words, c: char, _m: &mut Machine) {
    w.arg.push(match c {
        'r' => '\r',
        'n' => '\n',
        't' => '\t',
        'b' => '\u{8}',
        other => other,
    });
}

fn start_var(w: &mut Words, _c: char, _m: &mut Machine) {
    w.varname.clear();
}

fn var_char(w: &mut Words, c: char, _m: &mut Machine) {
    w.varname.push(c);
}

// The symbol that ended the name belongs to the surrounding text.
fn end_var(w: &mut Words, c: char, m: &mut Machine) {
    let name = std::mem::take(&mut w.varname);
    if name.is_empty() {
        w.arg.push('$');
    } else {
        w.substitute(name);
    }
    m.push(c);
}

fn end_braced(w: &mut Words, _c: char, _m: &mut Machine) {
    let name = std::mem::take(&mut w.varname);
    if env::is_valid_name(&name) {
        w.substitute(name);
    } else {
        w.events.push_back(LexEvent::Error(LexError::Expansion {
            name,
            reason: "bad substitution".to_string(),
        }));
    }
}

fn variable_rules(fsm: &mut Fsm<Words>, start: State, name: State, braced: State, home: State) {
    fsm.add_jump('{', start, braced);
    fsm.add_transitions(env::NAME_CHARS, start, var_char, name);
    fsm.add_transition(ANY, start, end_var, home);

    fsm.add_transitions(env::NAME_CHARS, name, var_char, name);
    fsm.add_transition(ANY, name, end_var, home);

    fsm.insert(ANY, braced, Transition::new(Some(var_char), None));
    fsm.add_transition('}', braced, end_braced, home);
}

fn grammar() -> Fsm<Words> {
    let mut fsm: Fsm<Words> = Fsm::new(BARE);

    fsm.add_transition(ANY, BARE, add_text, BARE);
    fsm.add_transitions(" \t", BARE, word_break, BARE);
    fsm.add_transitions(";\n", BARE, end_statement, BARE);
    fsm.add_jump('\\', BARE, ESCAPE);
    fsm.add_jump('\'', BARE, SINGLE_QUOTE);
    fsm.add_jump('"', BARE, DOUBLE_QUOTE);
    fsm.add_transition('$', BARE, start_var, VAR_START);

    fsm.add_transition(ANY, ESCAPE, escape, BARE);

    fsm.add_transition(ANY, SINGLE_QUOTE, add_text, SINGLE_QUOTE);
    fsm.add_transition('\'', SINGLE_QUOTE, close_quote, BARE);

    fsm.add_transition(ANY, DOUBLE_QUOTE, add_text, DOUBLE_QUOTE);
    fsm.add_transition('"', DOUBLE_QUOTE, close_quote, BARE);
    fsm.add_transition('\'', DOUBLE_QUOTE, add_text, QUOTE_IN_DOUBLE);
    fsm.add_jump('\\', DOUBLE_QUOTE, ESCAPE_IN_DOUBLE);
    fsm.add_transition('$', DOUBLE_QUOTE, start_var, VAR_START_IN_DOUBLE);

    fsm.add_transition(ANY, QUOTE_IN_DOUBLE, add_text, QUOTE_IN_DOUBLE);
    fsm.add_transition('\'', QUOTE_IN_DOUBLE, add_text, DOUBLE_QUOTE);

    fsm.add_transition(ANY, ESCAPE_IN_DOUBLE, escape, DOUBLE_QUOTE);

    variable_rules(&mut fsm, VAR_START, VAR_NAME, VAR_BRACED, BARE);
    variable_rules(
        &mut fsm,
        VAR_START_IN_DOUBLE,
        VAR_NAME_IN_DOUBLE,
        VAR_BRACED_IN_DOUBLE,
        DOUBLE_QUOTE,
    );

    fsm
}

/// Incremental command-line tokenizer.
///
/// State persists between calls to [`Lexer::feed_char`], so a statement may
/// span several chunks of input (an open quote continues on the next line).
pub struct Lexer {
    fsm: Fsm<Words>,
    words: Words,
}

impl Lexer {
    pub fn new(vars: Rc<dyn Variables>) -> Self {
        Self {
            fsm: grammar(),
            words: Words {
                arg: String::new(),
                varname: String::new(),
                args: Vec::new(),
                events: VecDeque::new(),
                vars,
            },
        }
    }

    /// Process one character, including any characters pushed back by it.
    pub fn feed_char(&mut self, c: char) {
        let mut next = Some(c);
        while let Some(symbol) = next {
            if let Err(err) = self.fsm.process(symbol, &mut self.words) {
                tracing::warn!(%err, "lexer reset");
                self.words.clear();
                self.words.events.push_back(LexEvent::Error(err.into()));
                return;
            }
            next = self.fsm.pop();
        }
    }

    /// Take the oldest pending event.
    pub fn next_event(&mut self) -> Option<LexEvent> {
        self.words.events.pop_front()
    }

    /// Feed a whole chunk and collect the events it produced.
    pub fn feed(&mut self, text: &str) -> Vec<LexEvent> {
        for c in text.chars() {
            self.feed_char(c);
        }
        self.words.events.drain(..).collect()
    }

    /// Tokenize `text` as a self-contained piece of input.
    ///
    /// A final newline is implied. The first error, an unclosed quote, or a
    /// trailing backslash fails the whole call and leaves the lexer reset.
    pub fn split(&mut self, text: &str) -> Result<Vec<Vec<String>>, LexError> {
        self.reset();
        let mut events = self.feed(text);
        events.extend(self.feed("\n"));
        if !self.is_complete() {
            self.reset();
            return Err(LexError::Unterminated);
        }
        events
            .into_iter()
            .map(|event| match event {
                LexEvent::Statement(argv) => Ok(argv),
                LexEvent::Error(err) => Err(err),
            })
            .collect()
    }

    /// True when no quote, escape or variable reference is open and no word
    /// is waiting for its statement to end. An escaped newline leaves a word
    /// pending, so the statement continues on the next line.
    pub fn is_complete(&self) -> bool {
        self.fsm.is_initial() && self.words.arg.is_empty() && self.words.args.is_empty()
    }

    pub fn state(&self) -> State {
        self.fsm.current_state()
    }

    /// Return to the initial state, discarding the partial statement and any
    /// undelivered events.
    pub fn reset(&mut self) {
        self.fsm.reset();
        self.words.clear();
        self.words.events.clear();
    }
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_./:,=+@%".contains(c)
}

/// Quote `word` so that the lexer reads it back as a single identical word.
pub fn quote(word: &str) -> Cow<'_, str> {
    if !word.is_empty() && word.chars().all(is_plain) {
        return Cow::Borrowed(word);
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        if matches!(c, '\\' | '"' | '$' | '\'') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Quote and space-join `argv`.
pub fn join<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|word| quote(word.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
