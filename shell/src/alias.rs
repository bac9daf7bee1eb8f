use indexmap::IndexMap;
use std::collections::HashSet;
use thiserror::Error;

/// Why an alias definition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AliasError {
    #[error("alias name must not be empty")]
    EmptyName,
    #[error("alias {0:?} needs a replacement")]
    EmptyReplacement(String),
}

/// Per-context table of command aliases.
///
/// An alias maps a name to a non-empty list of words that replaces the first
/// word of a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: IndexMap<String, Vec<String>>,
}

impl AliasTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace `name`.
    ///
    /// The replacement words are stored as given; they are not tokenized or
    /// expanded again.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        replacement: Vec<String>,
    ) -> Result<(), AliasError> {
        let name = name.into();
        if name.is_empty() {
            return Err(AliasError::EmptyName);
        }
        if replacement.is_empty() {
            return Err(AliasError::EmptyReplacement(name));
        }
        self.entries.insert(name, replacement);
        Ok(())
    }

    /// Replacement words of `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Remove `name`, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.entries.shift_remove(name)
    }

    /// Aliases in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Substitute aliases at the head of `argv` until the head is no longer an
    /// alias.
    ///
    /// The first word of every replacement is remembered. A replacement whose
    /// first word was already produced once stops the expansion and the
    /// current head is kept literally, so `ls=ls` or `a=b`, `b=a` terminate.
    pub fn expand(&self, mut argv: Vec<String>) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(replacement) = argv.first().and_then(|head| self.entries.get(head)) {
            if !seen.insert(replacement[0].as_str()) {
                break;
            }
            let name = argv.remove(0);
            tracing::debug!(alias = %name, ?replacement, "expanding alias");
            argv.splice(0..0, replacement.iter().cloned());
        }
        argv
    }
}
