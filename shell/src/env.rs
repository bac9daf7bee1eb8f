use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::cell::RefCell;
use std::env as stdenv;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use thiserror::Error;

/// Characters allowed in an unbraced variable name (`$NAME`).
pub const NAME_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_?";

/// Name of the variable holding the last command result.
pub const LAST_RESULT: &str = "_";
/// Name of the variable holding the last numeric status.
pub const LAST_STATUS: &str = "?";
/// Nesting depth of the command context stack.
pub const SHELL_LEVEL: &str = "SHLVL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("expected NAME=VALUE, got {0:?}")]
    MissingEquals(String),
    #[error("invalid variable name {0:?}")]
    InvalidName(String),
    #[error("environment is being modified")]
    Busy,
}

/// Returns true if `name` is non-empty and made only of [`NAME_CHARS`].
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| NAME_CHARS.contains(c))
}

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$([a-zA-Z0-9_?]+|\{[^}]*\})").expect("variable pattern is valid")
    })
}

/// Ordered, string-keyed variable store used by the interpreter.
///
/// Keeps insertion order so listings are stable. Values are plain strings;
/// the pseudo-variables `_` and `?` are stored like any other entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: IndexMap<String, String>,
}

impl Environment {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment into a new `Environment`.
    pub fn from_system() -> Self {
        let mut env = Self::new();
        env.inherit(stdenv::vars());
        env
    }

    /// Like `extend`, overwriting existing names.
    pub fn inherit<K, V>(&mut self, vars: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.vars.insert(k.into(), v.into());
        }
    }

    /// Value of `key`, if set.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// True when `key` is set, even to an empty string.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Store `val` verbatim.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Store `val` after expanding the `$NAME` references it contains.
    pub fn assign(&mut self, key: impl Into<String>, val: &str) {
        let expanded = self.expand(val);
        self.vars.insert(key.into(), expanded);
    }

    /// Return the current value of `key`, inserting `default` first if absent.
    pub fn set_default(&mut self, key: &str, default: impl Into<String>) -> &str {
        self.vars
            .entry(key.to_owned())
            .or_insert_with(|| default.into())
            .as_str()
    }

    /// Remove `key`, returning its old value. The order of the remaining
    /// entries is kept.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.shift_remove(key)
    }

    /// Assign from a `NAME=VALUE` string, expanding the value.
    ///
    /// Returns the assigned name.
    pub fn export(&mut self, assignment: &str) -> Result<String, EnvError> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| EnvError::MissingEquals(assignment.to_owned()))?;
        if name.is_empty() {
            return Err(EnvError::InvalidName(name.to_owned()));
        }
        self.assign(name, value);
        Ok(name.to_owned())
    }

    /// Replace every `$NAME` and `${NAME}` in `text` with its value.
    ///
    /// Unknown names expand to the empty string. Substituted text is not
    /// scanned again.
    pub fn expand(&self, text: &str) -> String {
        var_pattern()
            .replace_all(text, |caps: &Captures<'_>| {
                let name = &caps[1];
                let name = name
                    .strip_prefix('{')
                    .and_then(|n| n.strip_suffix('}'))
                    .unwrap_or(name);
                self.get_var(name).unwrap_or_default().to_owned()
            })
            .into_owned()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        lines.sort();
        f.write_str(&lines.join("\n"))
    }
}

/// Environment shared between the lexer, which reads it while tokenizing,
/// and the commands, which change it between statements.
pub type SharedEnv = Rc<RefCell<Environment>>;

/// Read-only variable lookup consulted while tokenizing.
pub trait Variables {
    fn lookup(&self, name: &str) -> Result<Option<String>, EnvError>;
}

impl Variables for Environment {
    fn lookup(&self, name: &str) -> Result<Option<String>, EnvError> {
        Ok(self.get_var(name).map(str::to_owned))
    }
}

impl Variables for RefCell<Environment> {
    fn lookup(&self, name: &str) -> Result<Option<String>, EnvError> {
        self.try_borrow().map_err(|_| EnvError::Busy)?.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();

        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE"));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::from_system();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_export_expands_previous_values() {
        let mut env = Environment::new();
        env.export("HOME=/home/user").unwrap();
        assert_eq!(env.get_var("HOME"), Some("/home/user"));
        env.export("PKGHOME=/opt/pkg").unwrap();
        env.export("PATH=$HOME/bin").unwrap();
        assert_eq!(env.get_var("PATH"), Some("/home/user/bin"));
        env.export("PATH=$PATH:${PKGHOME}/bin").unwrap();
        assert_eq!(env.expand("$PATH"), "/home/user/bin:/opt/pkg/bin");
    }

    #[test]
    fn test_export_rejects_malformed() {
        let mut env = Environment::new();
        assert_eq!(
            env.export("NOEQUALS"),
            Err(EnvError::MissingEquals("NOEQUALS".to_string()))
        );
        assert_eq!(env.export("=x"), Err(EnvError::InvalidName(String::new())));
    }

    #[test]
    fn test_status_symbol_expands() {
        let mut env = Environment::new();
        env.set_var(LAST_STATUS, "0");
        assert_eq!(env.expand("$?"), "0");
        assert_eq!(env.expand("[$?]"), "[0]");
    }

    #[test]
    fn test_expand_missing_is_empty_and_not_recursive() {
        let mut env = Environment::new();
        env.set_var("A", "$B");
        env.set_var("B", "deep");
        assert_eq!(env.expand("x${NOPE}y$NOPE"), "xy");
        assert_eq!(env.expand("$A"), "$B");
        assert_eq!(env.expand("cost: $"), "cost: $");
    }

    #[test]
    fn test_set_default_keeps_existing() {
        let mut env = Environment::new();
        assert_eq!(env.set_default("PS1", "> "), "> ");
        assert_eq!(env.set_default("PS1", "# "), "> ");
    }

    #[test]
    fn test_display_is_sorted() {
        let mut env = Environment::new();
        env.set_var("ZED", "1");
        env.set_var("ALPHA", "2");
        assert_eq!(env.to_string(), "ALPHA=2\nZED=1");
        assert_eq!(env.names(), vec!["ALPHA", "ZED"]);
    }

    #[test]
    fn test_refcell_lookup_reports_busy_borrow() {
        let shared = RefCell::new(Environment::new());
        shared.borrow_mut().set_var("X", "1");
        assert_eq!(shared.lookup("X"), Ok(Some("1".to_string())));

        let _guard = shared.borrow_mut();
        assert_eq!(shared.lookup("X"), Err(EnvError::Busy));
    }
}
