use indexmap::IndexMap;

/// Scope consulted for the first word of a line.
pub const COMMANDS_SCOPE: &str = "commands";

/// Named word lists used for tab completion.
///
/// The first word of a line completes from the [`COMMANDS_SCOPE`] list; any
/// later word completes from the list named after the word before it, so a
/// `help` scope completes the argument of `help`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionScopes {
    scopes: IndexMap<String, Vec<String>>,
}

impl CompletionScopes {
    /// No scopes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the word list of scope `name`, replacing any previous list.
    pub fn add<I, S>(&mut self, name: impl Into<String>, words: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes
            .insert(name.into(), words.into_iter().map(Into::into).collect());
    }

    /// Word list of scope `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.scopes.get(name).map(Vec::as_slice)
    }

    /// Drop scope `name`, returning its words.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.scopes.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Candidates for the word under the cursor.
    ///
    /// Returns the byte offset where the word starts and the matching words
    /// in scope order.
    pub fn complete(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let before = line.get(..pos).unwrap_or(line);
        let start = before
            .rfind(char::is_whitespace)
            .map_or(0, |i| i + before[i..].chars().next().map_or(1, char::len_utf8));
        let prefix = &before[start..];
        let scope = match before[..start].split_whitespace().next_back() {
            None => COMMANDS_SCOPE,
            Some(previous) => previous,
        };
        let candidates = self
            .get(scope)
            .unwrap_or_default()
            .iter()
            .filter(|word| word.starts_with(prefix))
            .cloned()
            .collect();
        (start, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes() -> CompletionScopes {
        let mut scopes = CompletionScopes::new();
        scopes.add(COMMANDS_SCOPE, ["echo", "exit", "help", "export"]);
        scopes.add("help", ["echo", "exit", "help", "export"]);
        scopes
    }

    #[test]
    fn test_first_word_uses_commands() {
        let (start, found) = scopes().complete("ex", 2);
        assert_eq!(start, 0);
        assert_eq!(found, vec!["exit", "export"]);

        let (_, found) = scopes().complete("", 0);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_later_word_uses_previous_word_scope() {
        let (start, found) = scopes().complete("help e", 6);
        assert_eq!(start, 5);
        assert_eq!(found, vec!["echo", "exit", "export"]);

        let (start, found) = scopes().complete("help ", 5);
        assert_eq!(start, 5);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_unknown_scope_has_no_candidates() {
        let (start, found) = scopes().complete("echo e", 6);
        assert_eq!(start, 5);
        assert!(found.is_empty());
    }

    #[test]
    fn test_cursor_mid_line() {
        let (start, found) = scopes().complete("he trailing", 2);
        assert_eq!(start, 0);
        assert_eq!(found, vec!["help"]);
    }

    #[test]
    fn test_remove_scope() {
        let mut s = scopes();
        assert!(s.remove("help").is_some());
        assert_eq!(s.get("help"), None);
        assert_eq!(s.len(), 1);
    }
}
