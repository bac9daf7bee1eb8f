use crate::alias::AliasTable;
use crate::controller::Controller;
use crate::env::Environment;
use crate::ui::Ui;
use argh::{EarlyExit, FromArgs};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Result a command hands back to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Status(i64),
    Text(String),
}

impl Value {
    /// Read `text` as a status when it is an integer, as text otherwise.
    pub fn parse(text: &str) -> Self {
        match text.trim().parse() {
            Ok(n) => Value::Status(n),
            Err(_) => Value::Text(text.to_owned()),
        }
    }

    /// Integer reading of the value; non-numeric text reads as 0.
    pub fn as_status(&self) -> i64 {
        match self {
            Value::Status(n) => *n,
            Value::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Status(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// What the interpreter should do after a command returns.
#[derive(Debug)]
pub enum Flow {
    /// Keep reading. A value, if any, becomes `$_` and `$?`.
    Continue(Option<Value>),
    /// Leave the current context, handing the value to its parent.
    Quit(Option<Value>),
    /// Stop the read loop altogether.
    Exit,
    /// Enter a nested context.
    Push(Box<Controller>),
    /// The user interrupted the command.
    Interrupted,
}

impl Flow {
    pub fn done() -> Self {
        Flow::Continue(None)
    }

    pub fn status(code: impl Into<i64>) -> Self {
        Flow::Continue(Some(Value::Status(code.into())))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Flow::Continue(Some(Value::Text(text.into())))
    }
}

/// An argument index past the end of the argument list.
///
/// Converts into [`CommandError::MissingArgument`] when a handler uses `?`
/// on [`Args::get`] itself. Passed through a helper returning
/// `anyhow::Result` it becomes an ordinary failure instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing argument at position {index}")]
pub struct MissingArgument {
    pub index: usize,
}

#[derive(Debug, Error)]
pub enum CommandError {
    /// The arguments do not fit the command's usage.
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    MissingArgument(#[from] MissingArgument),
    /// Option parsing rejected the arguments.
    #[error("{0}")]
    Options(String),
    /// Option parsing asked for the help text.
    #[error("{0}")]
    Help(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// The words of a statement, command name first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    argv: Vec<String>,
}

impl Args {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn name(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    pub fn get(&self, index: usize) -> Result<&str, MissingArgument> {
        self.argv
            .get(index)
            .map(String::as_str)
            .ok_or(MissingArgument { index })
    }

    pub fn get_or<'a>(&'a self, index: usize, default: &'a str) -> &'a str {
        self.argv.get(index).map_or(default, String::as_str)
    }

    /// Words from `index` on; empty when `index` is past the end.
    pub fn rest(&self, index: usize) -> &[String] {
        self.argv.get(index..).unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.argv
    }

    pub fn len(&self) -> usize {
        self.argv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Parse the words after the name with [`argh`].
    pub fn parse<T: FromArgs>(&self) -> Result<T, CommandError> {
        let rest: Vec<&str> = self.rest(1).iter().map(String::as_str).collect();
        T::from_args(&[self.name()], &rest).map_err(|EarlyExit { output, status }| match status {
            Ok(()) => CommandError::Help(output),
            Err(()) => CommandError::Options(output.trim_end().to_owned()),
        })
    }
}

/// Everything a handler may touch while it runs.
pub struct CallContext<'a> {
    pub env: &'a mut Environment,
    pub ui: &'a mut dyn Ui,
    pub aliases: &'a mut AliasTable,
    pub commands: &'a CommandSet,
}

pub type Handler = Rc<dyn Fn(&mut CallContext<'_>, &Args) -> Result<Flow, CommandError>>;

#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    /// Name the handler was first registered under.
    pub canonical: String,
    pub usage: String,
    pub handler: Handler,
}

impl CommandSpec {
    /// One-line description for listings.
    pub fn summary(&self) -> &str {
        let mut lines = self.usage.lines().map(str::trim).filter(|l| !l.is_empty());
        let first = lines.clone().next().unwrap_or_default();
        lines.find(|l| !l.starts_with("Usage:")).unwrap_or(first)
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("canonical", &self.canonical)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command name {0:?} is reserved")]
    ReservedName(String),
    #[error("command {0:?} needs usage text")]
    MissingUsage(String),
    #[error("no command named {0:?}")]
    Unknown(String),
}

/// Name to handler table of one context.
#[derive(Debug, Clone, Default)]
pub struct CommandSet {
    specs: IndexMap<String, CommandSpec>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding the standard commands.
    pub fn with_builtins() -> Self {
        let mut set = Self::new();
        crate::builtin::install_all(&mut set);
        set
    }

    /// Register `handler` under `name`, replacing any previous entry.
    ///
    /// Names starting with `_` are never dispatched and are rejected here;
    /// every command needs usage text for `help` and error reports.
    pub fn register<F>(
        &mut self,
        name: &str,
        usage: &str,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&mut CallContext<'_>, &Args) -> Result<Flow, CommandError> + 'static,
    {
        if name.is_empty() || name.starts_with('_') {
            return Err(RegistryError::ReservedName(name.to_owned()));
        }
        if usage.trim().is_empty() {
            return Err(RegistryError::MissingUsage(name.to_owned()));
        }
        self.insert(name, usage.to_owned(), Rc::new(handler));
        Ok(())
    }

    pub(crate) fn insert(&mut self, name: &str, usage: String, handler: Handler) {
        self.specs.insert(
            name.to_owned(),
            CommandSpec {
                name: name.to_owned(),
                canonical: name.to_owned(),
                usage,
                handler,
            },
        );
    }

    /// Make `name` another way to call `existing`.
    pub fn bind(&mut self, name: &str, existing: &str) -> Result<(), RegistryError> {
        if name.is_empty() || name.starts_with('_') {
            return Err(RegistryError::ReservedName(name.to_owned()));
        }
        let mut spec = self
            .specs
            .get(existing)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(existing.to_owned()))?;
        spec.name = name.to_owned();
        self.specs.insert(name.to_owned(), spec);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.specs.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<CommandSpec> {
        self.specs.shift_remove(name)
    }

    /// Sorted command names, one per distinct handler.
    pub fn names(&self) -> Vec<&str> {
        let mut kept: Vec<&CommandSpec> = Vec::new();
        for spec in self.specs.values() {
            if !kept.iter().any(|k| Rc::ptr_eq(&k.handler, &spec.handler)) {
                kept.push(spec);
            }
        }
        let mut names: Vec<&str> = kept.iter().map(|s| s.canonical.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Every registered name, bound names included.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
