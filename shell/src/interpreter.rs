use crate::command::{Flow, Value};
use crate::completion::{COMMANDS_SCOPE, CompletionScopes};
use crate::controller::Controller;
use crate::env::{Environment, SHELL_LEVEL, SharedEnv, Variables};
use crate::lexer::{LexError, LexEvent, Lexer};
use crate::prompt::expand_prompt;
use crate::ui::Ui;
use anyhow::{Context, bail};
use std::cell::{Ref, RefCell};
use std::io::BufRead;
use std::rc::Rc;

const DEFAULT_PS1: &str = "> ";
const DEFAULT_PS2: &str = "more> ";

/// One answer from a [`LineReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A line without its terminator.
    Line(String),
    Eof,
    /// Ctrl-C at the prompt.
    Interrupted,
    Error(String),
}

/// Source of interactive input.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> ReadLine;

    /// Called before every prompt with the current context's scopes.
    fn set_completion(&mut self, _scopes: &CompletionScopes) {}
}

/// Why feeding input stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The last context was popped.
    Quit,
    /// A command asked to leave every context.
    Exit,
    /// The running statement was interrupted; the rest of the input is dropped.
    Interrupted,
}

/// Whether the input fed so far ends on a statement boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Complete,
    /// A quote or escape is still open and more input is needed.
    Incomplete,
}

/// The read-dispatch loop.
///
/// Input goes through the [`Lexer`] one character at a time and every
/// finished statement is dispatched to the innermost [`Controller`] before the
/// next character is read, so `setenv X 1; echo $X` sees the new value.
///
/// Example
/// ```
/// use command_shell::{CommandSet, Controller, Environment, Interpreter, MemoryUi};
/// let (ui, out, _) = MemoryUi::with_handle();
/// let mut sh = Interpreter::new(Environment::new(), Box::new(ui));
/// sh.push_context(Controller::new("main", CommandSet::with_builtins()));
/// sh.feed("setenv WHO world; echo hello $WHO\n").unwrap();
/// assert_eq!(out.borrow().as_str(), "hello world\n");
/// ```
pub struct Interpreter {
    env: SharedEnv,
    ui: Box<dyn Ui>,
    lexer: Lexer,
    contexts: Vec<Controller>,
}

impl Interpreter {
    pub fn new(env: Environment, ui: Box<dyn Ui>) -> Self {
        let env: SharedEnv = Rc::new(RefCell::new(env));
        let vars: Rc<dyn Variables> = env.clone();
        Self {
            env,
            ui,
            lexer: Lexer::new(vars),
            contexts: Vec::new(),
        }
    }

    /// Borrow the environment. Do not hold the borrow across [`feed`](Self::feed).
    pub fn env(&self) -> Ref<'_, Environment> {
        self.env.borrow()
    }

    pub fn shared_env(&self) -> SharedEnv {
        self.env.clone()
    }

    pub fn ui_mut(&mut self) -> &mut dyn Ui {
        self.ui.as_mut()
    }

    /// Number of active contexts.
    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// The innermost context.
    pub fn current(&self) -> Option<&Controller> {
        self.contexts.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Controller> {
        self.contexts.last_mut()
    }

    /// Make `controller` the innermost context.
    pub fn push_context(&mut self, mut controller: Controller) {
        {
            let mut env = self.env.borrow_mut();
            let level = env.set_default(SHELL_LEVEL, "0").parse::<i64>().unwrap_or(0);
            env.set_var(SHELL_LEVEL, (level + 1).to_string());
        }
        let commands = controller.get_commands();
        controller
            .completion_mut()
            .add(COMMANDS_SCOPE, commands.iter().cloned());
        controller.completion_mut().add("help", commands);
        tracing::debug!(context = %controller.name(), depth = self.contexts.len() + 1, "push context");
        self.contexts.push(controller);
    }

    /// Leave the innermost context, handing `value` to its parent.
    ///
    /// Fails with [`Halt::Quit`] once no context is left.
    pub fn pop_context(&mut self, value: Option<Value>) -> Result<(), Halt> {
        let Some(child) = self.contexts.pop() else {
            return Err(Halt::Quit);
        };
        tracing::debug!(context = %child.name(), ?value, "pop context");

        let mut env = self.env.borrow_mut();
        let level = env
            .get_var(SHELL_LEVEL)
            .and_then(|l| l.parse::<i64>().ok())
            .unwrap_or(1);
        env.set_var(SHELL_LEVEL, (level - 1).max(0).to_string());

        match self.contexts.last_mut() {
            Some(parent) => {
                parent.handle_subcommand(value, &mut env, self.ui.as_mut());
                Ok(())
            }
            None => Err(Halt::Quit),
        }
    }

    /// Run one statement in the innermost context and act on its [`Flow`].
    pub fn dispatch(&mut self, argv: Vec<String>) -> Result<(), Halt> {
        tracing::trace!(?argv, "statement");
        let Some(controller) = self.contexts.last_mut() else {
            return Err(Halt::Quit);
        };
        let flow = {
            let mut env = self.env.borrow_mut();
            controller.call(argv, &mut env, self.ui.as_mut())
        };
        match flow {
            Flow::Continue(_) => Ok(()),
            Flow::Quit(value) => self.pop_context(value),
            Flow::Push(child) => {
                self.push_context(*child);
                Ok(())
            }
            Flow::Exit => Err(Halt::Exit),
            Flow::Interrupted => Err(Halt::Interrupted),
        }
    }

    /// Feed raw input, dispatching each statement as soon as it ends.
    ///
    /// On a [`Halt`] the rest of `text` and any partial statement are
    /// dropped.
    pub fn feed(&mut self, text: &str) -> Result<Input, Halt> {
        for c in text.chars() {
            self.lexer.feed_char(c);
            while let Some(event) = self.lexer.next_event() {
                let outcome = match event {
                    LexEvent::Statement(argv) => self.dispatch(argv),
                    LexEvent::Error(err) => {
                        self.report(&err);
                        Ok(())
                    }
                };
                if let Err(halt) = outcome {
                    self.lexer.reset();
                    return Err(halt);
                }
            }
        }
        if self.lexer.is_complete() {
            Ok(Input::Complete)
        } else {
            Ok(Input::Incomplete)
        }
    }

    /// Feed `text` as a complete line.
    pub fn run_line(&mut self, text: &str) -> Result<Input, Halt> {
        let mut line = text.to_owned();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.feed(&line)
    }

    fn report(&mut self, err: &LexError) {
        match err {
            LexError::Syntax { symbol, stack } => {
                self.ui.error(&format!("Syntax error: {symbol:?}\n{stack:?}"));
            }
            LexError::Expansion { name, reason } => {
                self.ui
                    .error(&format!("Could not expand variable {name:?}: {reason}"));
            }
            LexError::Unterminated => self.ui.error(&err.to_string()),
        }
    }

    /// Expanded primary prompt: the context's own, else `$PS1`.
    pub fn prompt(&self) -> String {
        let env = self.env.borrow();
        let template = self
            .contexts
            .last()
            .and_then(Controller::prompt)
            .or_else(|| env.get_var("PS1"))
            .unwrap_or(DEFAULT_PS1);
        expand_prompt(template, &env)
    }

    /// Expanded `$PS2`, shown while a statement is open.
    pub fn continuation_prompt(&self) -> String {
        let env = self.env.borrow();
        expand_prompt(env.get_var("PS2").unwrap_or(DEFAULT_PS2), &env)
    }

    /// Read and run lines until the last context quits, a command exits,
    /// or the input ends.
    ///
    /// End of input quits the current context like `exit` would. Ctrl-C
    /// drops the statement being typed.
    pub fn interact(&mut self, reader: &mut dyn LineReader) -> anyhow::Result<()> {
        loop {
            let Some(controller) = self.contexts.last() else {
                return Ok(());
            };
            reader.set_completion(controller.completion());

            let mut line = match reader.read_line(&self.prompt()) {
                ReadLine::Line(line) => line,
                ReadLine::Eof => {
                    self.ui.print("");
                    match self.pop_context(None) {
                        Ok(()) => continue,
                        Err(_) => return Ok(()),
                    }
                }
                ReadLine::Interrupted => {
                    self.lexer.reset();
                    continue;
                }
                ReadLine::Error(msg) => bail!("reading input: {msg}"),
            };
            if line.is_empty() {
                continue;
            }

            loop {
                line.push('\n');
                match self.feed(&line) {
                    Ok(Input::Complete) => break,
                    Ok(Input::Incomplete) => match reader.read_line(&self.continuation_prompt()) {
                        ReadLine::Line(more) => line = more,
                        ReadLine::Eof | ReadLine::Interrupted => {
                            self.lexer.reset();
                            break;
                        }
                        ReadLine::Error(msg) => bail!("reading input: {msg}"),
                    },
                    Err(Halt::Interrupted) => {
                        self.ui.print("");
                        break;
                    }
                    Err(Halt::Quit | Halt::Exit) => return Ok(()),
                }
            }
        }
    }

    /// Run every line of `reader` as if typed at the prompt.
    ///
    /// Stops early when the input quits or exits. A statement left open at
    /// the end is reported and dropped.
    pub fn parse_reader(&mut self, reader: impl BufRead) -> anyhow::Result<()> {
        for (number, line) in reader.lines().enumerate() {
            let mut line = line.with_context(|| format!("reading line {}", number + 1))?;
            line.push('\n');
            if let Err(halt) = self.feed(&line) {
                tracing::debug!(?halt, line = number + 1, "script stopped");
                return Ok(());
            }
        }
        if !self.lexer.is_complete() {
            self.lexer.reset();
            self.ui.error(&LexError::Unterminated.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Args, CallContext, CommandError, CommandSet};
    use crate::ui::MemoryUi;
    use std::collections::VecDeque;
    use std::io::Cursor;

    struct Shell {
        sh: Interpreter,
        out: Rc<RefCell<String>>,
        err: Rc<RefCell<String>>,
    }

    impl Shell {
        fn output(&self) -> String {
            self.out.borrow().clone()
        }

        fn errors(&self) -> String {
            self.err.borrow().clone()
        }

        fn var(&self, name: &str) -> Option<String> {
            self.sh.env().get_var(name).map(str::to_owned)
        }
    }

    fn nest(_cx: &mut CallContext<'_>, args: &Args) -> Result<Flow, CommandError> {
        let name = args.get_or(1, "inner").to_owned();
        let child = Controller::new(name, commands()).with_prompt("(inner) ");
        Ok(Flow::Push(Box::new(child)))
    }

    fn commands() -> CommandSet {
        let mut set = CommandSet::with_builtins();
        set.register("nest", "Usage: nest [name]\nStart a nested context.", nest)
            .unwrap();
        set.register("halt", "Usage: halt\nLeave every context.", |_cx, _args| {
            Ok(Flow::Exit)
        })
        .unwrap();
        set.register("ctrlc", "Usage: ctrlc\nPretend to be interrupted.", |_cx, _args| {
            Ok(Flow::Interrupted)
        })
        .unwrap();
        set
    }

    fn shell() -> Shell {
        let (ui, out, err) = MemoryUi::with_handle();
        let mut sh = Interpreter::new(Environment::new(), Box::new(ui));
        let main = Controller::new("main", commands()).on_subcommand(|value, env, _ui| {
            let text = value.map(|v| v.to_string()).unwrap_or_default();
            env.set_var("CHILD", text);
        });
        sh.push_context(main);
        Shell { sh, out, err }
    }

    struct Script {
        lines: VecDeque<ReadLine>,
        prompts: Vec<String>,
        scopes: Option<CompletionScopes>,
    }

    impl Script {
        fn new(lines: Vec<ReadLine>) -> Self {
            Self {
                lines: lines.into(),
                prompts: Vec::new(),
                scopes: None,
            }
        }
    }

    impl LineReader for Script {
        fn read_line(&mut self, prompt: &str) -> ReadLine {
            self.prompts.push(prompt.to_owned());
            self.lines.pop_front().unwrap_or(ReadLine::Eof)
        }

        fn set_completion(&mut self, scopes: &CompletionScopes) {
            self.scopes = Some(scopes.clone());
        }
    }

    fn line(text: &str) -> ReadLine {
        ReadLine::Line(text.to_owned())
    }

    #[test]
    fn test_statements_run_in_order() {
        let mut s = shell();
        assert_eq!(s.sh.feed("echo a; echo b\necho c\n"), Ok(Input::Complete));
        assert_eq!(s.output(), "a\nb\nc\n");
    }

    #[test]
    fn test_assignment_visible_later_on_same_line() {
        let mut s = shell();
        s.sh.feed("setenv X 1; echo $X\n").unwrap();
        assert_eq!(s.output(), "1\n");
    }

    #[test]
    fn test_open_quote_needs_more_input() {
        let mut s = shell();
        assert_eq!(s.sh.feed("echo \"open\n"), Ok(Input::Incomplete));
        assert_eq!(s.output(), "");
        assert_eq!(s.sh.feed("quote\"\n"), Ok(Input::Complete));
        assert_eq!(s.output(), "open\nquote\n");
    }

    #[test]
    fn test_status_recorded() {
        let mut s = shell();
        s.sh.feed("nosuchcommand\necho $?\n").unwrap();
        assert_eq!(s.output(), "2\n");
        assert!(s.errors().contains("unknown command"));
    }

    #[test]
    fn test_nested_contexts_track_level() {
        let mut s = shell();
        assert_eq!(s.var("SHLVL").as_deref(), Some("1"));

        s.sh.feed("nest\n").unwrap();
        assert_eq!(s.sh.depth(), 2);
        assert_eq!(s.sh.current().map(Controller::name), Some("inner"));
        assert_eq!(s.var("SHLVL").as_deref(), Some("2"));
        assert_eq!(s.sh.prompt(), "(inner) ");

        s.sh.feed("exit 5\n").unwrap();
        assert_eq!(s.sh.depth(), 1);
        assert_eq!(s.var("SHLVL").as_deref(), Some("1"));
        assert_eq!(s.var("CHILD").as_deref(), Some("5"));

        assert_eq!(s.sh.feed("exit\n"), Err(Halt::Quit));
        assert_eq!(s.sh.depth(), 0);
    }

    #[test]
    fn test_quit_mid_line_continues_in_parent() {
        let mut s = shell();
        s.sh.feed("nest; exit done; echo back in $CHILD\n").unwrap();
        assert_eq!(s.sh.depth(), 1);
        assert_eq!(s.output(), "back in done\n");
    }

    #[test]
    fn test_exit_drops_rest_of_input() {
        let mut s = shell();
        assert_eq!(s.sh.feed("nest; halt; echo unreachable\n"), Err(Halt::Exit));
        assert_eq!(s.output(), "");
        assert!(s.sh.lexer.is_complete());
    }

    #[test]
    fn test_interrupt_drops_rest_of_input() {
        let mut s = shell();
        assert_eq!(s.sh.feed("ctrlc; echo unreachable\n"), Err(Halt::Interrupted));
        assert_eq!(s.output(), "");
        assert_eq!(s.sh.depth(), 1);
    }

    #[test]
    fn test_lex_errors_are_reported() {
        let mut s = shell();
        s.sh.feed("echo ${a b}\necho ok\n").unwrap();
        assert!(s.errors().contains("Could not expand variable"));
        assert!(s.output().ends_with("ok\n"));
    }

    #[test]
    fn test_completion_seeded_on_push() {
        let s = shell();
        let scopes = s.sh.current().unwrap().completion();
        let commands = scopes.get(COMMANDS_SCOPE).unwrap();
        assert!(commands.iter().any(|c| c == "echo"));
        assert!(commands.iter().any(|c| c == "nest"));
        assert_eq!(scopes.get("help"), Some(commands));
    }

    #[test]
    fn test_completion_skips_bound_names() {
        let mut s = shell();
        let mut set = commands();
        set.bind("quit", "exit").unwrap();
        s.sh.push_context(Controller::new("bound", set));
        let scopes = s.sh.current().unwrap().completion();
        let listed = scopes.get(COMMANDS_SCOPE).unwrap();
        assert!(listed.iter().any(|c| c == "exit"));
        assert!(!listed.iter().any(|c| c == "quit"));
        assert_eq!(scopes.get("help"), Some(listed));
    }

    #[test]
    fn test_prompts_from_environment() {
        let mut s = shell();
        assert_eq!(s.sh.prompt(), "> ");
        assert_eq!(s.sh.continuation_prompt(), "more> ");
        s.sh.feed("setenv PS1 '[%L]%% '\nsetenv PS2 ...\n").unwrap();
        assert_eq!(s.sh.prompt(), "[1]% ");
        assert_eq!(s.sh.continuation_prompt(), "...");
    }

    #[test]
    fn test_interact_until_eof() {
        let mut s = shell();
        let mut script = Script::new(vec![
            line("echo one"),
            line(""),
            line("echo 'two"),
            line("lines'"),
            line("nest"),
            line("echo deep"),
        ]);
        s.sh.interact(&mut script).unwrap();

        assert_eq!(s.output(), "one\ntwo\nlines\ndeep\n\n\n");
        assert_eq!(s.sh.depth(), 0);
        assert_eq!(
            script.prompts,
            vec!["> ", "> ", "> ", "more> ", "> ", "(inner) ", "(inner) ", "> "]
        );
        assert!(script.scopes.is_some());
    }

    #[test]
    fn test_interact_ctrl_c_discards_statement() {
        let mut s = shell();
        let mut script = Script::new(vec![
            line("echo \"never"),
            ReadLine::Interrupted,
            line("echo fresh"),
            ReadLine::Interrupted,
            line("halt"),
            line("echo unreachable"),
        ]);
        s.sh.interact(&mut script).unwrap();
        assert_eq!(s.output(), "fresh\n");
        assert_eq!(s.sh.depth(), 1);
    }

    #[test]
    fn test_interact_read_error() {
        let mut s = shell();
        let mut script = Script::new(vec![ReadLine::Error("broken".into())]);
        let err = s.sh.interact(&mut script).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_parse_reader() {
        let mut s = shell();
        let script = "setenv GREETING hi\necho \"$GREETING\n there\"\nexit\necho unreachable\n";
        s.sh.parse_reader(Cursor::new(script)).unwrap();
        assert_eq!(s.output(), "hi\n there\n");
        assert_eq!(s.sh.depth(), 0);
    }

    #[test]
    fn test_parse_reader_reports_open_statement() {
        let mut s = shell();
        s.sh.parse_reader(Cursor::new("echo 'left open\n")).unwrap();
        assert_eq!(s.output(), "");
        assert!(s.errors().contains("unexpected end of input"));
        assert!(s.sh.lexer.is_complete());
    }

    #[test]
    fn test_run_line_adds_terminator() {
        let mut s = shell();
        assert_eq!(s.sh.run_line("echo x"), Ok(Input::Complete));
        assert_eq!(s.output(), "x\n");
    }
}
