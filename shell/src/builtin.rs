use crate::command::{Args, CallContext, CommandError, CommandSet, Flow, Value};
use crate::external::{self, INTERRUPTED};
use crate::lexer;
use argh::{EarlyExit, FromArgs};
use std::rc::Rc;

/// Commands every context gets from [`CommandSet::with_builtins`].
///
/// A builtin is parsed from the statement's words first, then executed with
/// the calling context. Parsing errors surface as [`CommandError`]s so the
/// controller can report them with the command's usage.
pub(crate) trait Builtin: Sized + 'static {
    /// Canonical name of the command, e.g. "echo" or "alias".
    fn name() -> &'static str;

    /// Text shown by `help <name>` and after usage errors.
    fn usage() -> String;

    fn from_args(args: &Args) -> Result<Self, CommandError>;

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError>;
}

fn run<T: Builtin>(cx: &mut CallContext<'_>, args: &Args) -> Result<Flow, CommandError> {
    T::from_args(args)?.execute(cx)
}

pub(crate) fn install<T: Builtin>(set: &mut CommandSet) {
    set.insert(T::name(), T::usage(), Rc::new(run::<T>));
}

pub(crate) fn install_all(set: &mut CommandSet) {
    install::<Echo>(set);
    install::<PrintEnv>(set);
    install::<Export>(set);
    install::<Unset>(set);
    install::<SetEnv>(set);
    install::<Help>(set);
    install::<Alias>(set);
    install::<Unalias>(set);
    install::<Exit>(set);
    install::<Pipe>(set);
    install::<Spawn>(set);
}

/// The `--help` text argh generates for `T`.
fn argh_usage<T: FromArgs>(name: &str) -> String {
    match T::from_args(&[name], &["--help"]) {
        Err(EarlyExit { output, .. }) => output,
        Ok(_) => String::new(),
    }
}

#[derive(FromArgs)]
/// Write the arguments separated by spaces, then a newline.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub words: Vec<String>,
}

impl Builtin for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn usage() -> String {
        argh_usage::<Self>(Self::name())
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        args.parse()
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        cx.ui.write(&self.words.join(" "));
        if !self.no_newline {
            cx.ui.write("\n");
        }
        Ok(Flow::done())
    }
}

#[derive(FromArgs)]
/// Show the variables commands and child processes see.
pub struct PrintEnv {
    #[argh(positional, greedy)]
    /// variables to show; all of them when omitted.
    pub names: Vec<String>,
}

impl Builtin for PrintEnv {
    fn name() -> &'static str {
        "printenv"
    }

    fn usage() -> String {
        argh_usage::<Self>(Self::name())
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        args.parse()
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        if self.names.is_empty() {
            let names = cx.env.names();
            let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
            for name in names {
                let value = cx.env.get_var(name).unwrap_or_default();
                cx.ui.print(&format!("{name:width$} = {value:?}"));
            }
            return Ok(Flow::done());
        }
        for name in &self.names {
            match cx.env.get_var(name) {
                Some(value) => cx.ui.print(&format!("{name} = {value:?}")),
                None => cx.ui.print(&format!("'{name}' not in environment.")),
            }
        }
        Ok(Flow::done())
    }
}

pub struct Export {
    assignments: Vec<String>,
}

impl Builtin for Export {
    fn name() -> &'static str {
        "export"
    }

    fn usage() -> String {
        "Set variables that child processes inherit. $NAME references in a value \
         are expanded.\n\nUsage: export NAME=VALUE..."
            .to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        Ok(Export {
            assignments: args.rest(1).to_vec(),
        })
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        for assignment in &self.assignments {
            if let Err(e) = cx.env.export(assignment) {
                cx.ui.print(&format!("** could not set value: ({e})"));
            }
        }
        Ok(Flow::done())
    }
}

pub struct Unset {
    name: String,
}

impl Builtin for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn usage() -> String {
        "Remove a variable.\n\nUsage: unset <name>".to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        Ok(Unset {
            name: args.get(1)?.to_owned(),
        })
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        if cx.env.remove(&self.name).is_none() {
            tracing::warn!(name = %self.name, "unset of missing variable");
            cx.ui.warning("No such environment variable.");
            return Ok(Flow::status(1));
        }
        Ok(Flow::done())
    }
}

#[derive(FromArgs)]
/// Set NAME to VALUE exactly as given, without expansion.
pub struct SetEnv {
    #[argh(positional)]
    /// variable to set.
    pub name: String,

    #[argh(positional)]
    /// new value.
    pub value: String,
}

impl Builtin for SetEnv {
    fn name() -> &'static str {
        "setenv"
    }

    fn usage() -> String {
        argh_usage::<Self>(Self::name())
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        args.parse()
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        cx.env.set_var(self.name, self.value);
        Ok(Flow::done())
    }
}

#[derive(FromArgs)]
/// List the commands, or describe the named ones.
pub struct Help {
    #[argh(positional, greedy)]
    /// commands to describe.
    pub names: Vec<String>,
}

impl Builtin for Help {
    fn name() -> &'static str {
        "help"
    }

    fn usage() -> String {
        argh_usage::<Self>(Self::name())
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        args.parse()
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        if self.names.is_empty() {
            let names = cx.commands.names();
            let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
            for name in names {
                let summary = cx.commands.lookup(name).map_or("", |spec| spec.summary());
                cx.ui.print(&format!("{name:width$}  {summary}"));
            }
            return Ok(Flow::done());
        }
        for name in &self.names {
            match cx.commands.lookup(name) {
                Some(spec) => {
                    cx.ui.print("");
                    cx.ui.print(name);
                    cx.ui.help_local(&spec.usage);
                }
                None => cx.ui.print(&format!("No command named '{name}' found.")),
            }
        }
        Ok(Flow::done())
    }
}

pub struct Alias {
    words: Vec<String>,
}

impl Alias {
    /// Split `words` into the alias name and its replacement, accepting
    /// `name=a b`, `name = a b` and `name =a b`.
    fn definition(words: Vec<String>) -> (String, Vec<String>) {
        let mut words = words.into_iter();
        let first = words.next().unwrap_or_default();
        let mut rest: Vec<String> = words.collect();

        if let Some((name, rhs)) = first.split_once('=') {
            if !rhs.is_empty() {
                rest.insert(0, rhs.to_owned());
            }
            return (name.to_owned(), rest);
        }
        if rest.first().is_some_and(|w| w == "=") {
            rest.remove(0);
        } else if let Some(w) = rest.first_mut() {
            if let Some(stripped) = w.strip_prefix('=') {
                *w = stripped.to_owned();
            }
        }
        (first, rest)
    }
}

impl Builtin for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn usage() -> String {
        "Manage aliases.\n\n\
         With no argument, list the current aliases. With a single name, show\n\
         that alias. Otherwise define one; the '=' may stand alone or touch\n\
         either word.\n\n\
         Usage: alias [name[=]value...]"
            .to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        Ok(Alias {
            words: args.rest(1).to_vec(),
        })
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        match self.words.as_slice() {
            [] => {
                for (name, replacement) in cx.aliases.iter() {
                    cx.ui.print(&format!("alias {name}={}", lexer::join(replacement)));
                }
                return Ok(Flow::status(0));
            }
            [name] if !name.contains('=') => {
                match cx.aliases.get(name) {
                    Some(replacement) => {
                        cx.ui.print(&format!("{name}={}", lexer::join(replacement)))
                    }
                    None => cx.ui.print("undefined alias."),
                }
                return Ok(Flow::status(0));
            }
            _ => {}
        }

        let (name, replacement) = Alias::definition(self.words);
        match cx.aliases.set(name, replacement) {
            Ok(()) => Ok(Flow::done()),
            Err(e) => {
                cx.ui.error(&e.to_string());
                cx.ui.print("alias: Could not set alias. Usage: alias name=value");
                Ok(Flow::status(1))
            }
        }
    }
}

pub struct Unalias {
    name: String,
}

impl Builtin for Unalias {
    fn name() -> &'static str {
        "unalias"
    }

    fn usage() -> String {
        "Remove the named alias.\n\nUsage: unalias <name>".to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        Ok(Unalias {
            name: args.get(1)?.to_owned(),
        })
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        if cx.aliases.remove(&self.name).is_none() {
            cx.ui.print(&format!("unalias: {}: not found", self.name));
        }
        Ok(Flow::done())
    }
}

pub struct Exit {
    value: Option<Value>,
}

impl Builtin for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn usage() -> String {
        "Leave this command context. The optional value is handed to the\n\
         enclosing context.\n\nUsage: exit [value]"
            .to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        Ok(Exit {
            value: args.get(1).ok().map(Value::parse),
        })
    }

    fn execute(self, _cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        Ok(Flow::Quit(self.value))
    }
}

pub struct Pipe {
    argv: Vec<String>,
}

impl Builtin for Pipe {
    fn name() -> &'static str {
        "pipe"
    }

    fn usage() -> String {
        "Run a program and show what it writes. `!program args` is a shorthand.\n\n\
         Usage: pipe <program> [args...]"
            .to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        args.get(1)?;
        Ok(Pipe {
            argv: args.rest(1).to_vec(),
        })
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        let (code, output) = external::run_captured(&self.argv, cx.env)?;
        cx.ui.write(&output);
        if code == INTERRUPTED {
            return Ok(Flow::Interrupted);
        }
        Ok(Flow::status(code))
    }
}

pub struct Spawn {
    argv: Vec<String>,
}

impl Builtin for Spawn {
    fn name() -> &'static str {
        "spawn"
    }

    fn usage() -> String {
        "Run a program attached to the terminal. `%program args` is a shorthand.\n\n\
         Usage: spawn <program> [args...]"
            .to_string()
    }

    fn from_args(args: &Args) -> Result<Self, CommandError> {
        args.get(1)?;
        Ok(Spawn {
            argv: args.rest(1).to_vec(),
        })
    }

    fn execute(self, cx: &mut CallContext<'_>) -> Result<Flow, CommandError> {
        let code = external::run_inherited(&self.argv, cx.env)?;
        if code == INTERRUPTED {
            return Ok(Flow::Interrupted);
        }
        Ok(Flow::status(code))
    }
}
