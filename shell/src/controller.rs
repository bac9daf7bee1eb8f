use crate::alias::{AliasError, AliasTable};
use crate::command::{
    Args, CallContext, CommandError, CommandSet, Flow, Handler, MissingArgument, Value,
};
use crate::completion::CompletionScopes;
use crate::env::{EnvError, Environment, LAST_RESULT, LAST_STATUS};
use crate::ui::Ui;
use std::fmt;
use std::rc::Rc;

/// Reports a failed command: receives the error kind, the message and the ui.
pub type ExceptHook = Box<dyn Fn(&str, &str, &mut dyn Ui)>;

/// Receives the value a nested context quit with.
pub type SubcommandHook = Box<dyn FnMut(Option<Value>, &mut Environment, &mut dyn Ui)>;

fn unknown_command(cx: &mut CallContext<'_>, args: &Args) -> Result<Flow, CommandError> {
    cx.ui.error(&format!("unknown command: {:?}", args.name()));
    Ok(Flow::status(2))
}

fn report_failure(kind: &str, message: &str, ui: &mut dyn Ui) {
    ui.error(&format!("{kind}: {message}"));
}

/// Short name for the kind of a handler failure, used by the except hook.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.is::<MissingArgument>() {
            return "MissingArgument";
        }
        if cause.is::<std::io::Error>() {
            return "IoError";
        }
        if cause.is::<EnvError>() {
            return "EnvError";
        }
        if cause.is::<AliasError>() {
            return "AliasError";
        }
    }
    "Error"
}

/// One level of the interpreter's context stack.
///
/// Owns the commands, aliases and completion scopes visible while it is the
/// innermost context, plus the hooks that customize how it reports errors
/// and receives values from nested contexts.
pub struct Controller {
    name: String,
    commands: CommandSet,
    aliases: AliasTable,
    completion: CompletionScopes,
    prompt: Option<String>,
    default: Handler,
    except_hook: ExceptHook,
    on_subcommand: Option<SubcommandHook>,
}

impl Controller {
    pub fn new(name: impl Into<String>, commands: CommandSet) -> Self {
        Self {
            name: name.into(),
            commands,
            aliases: AliasTable::new(),
            completion: CompletionScopes::new(),
            prompt: None,
            default: Rc::new(unknown_command),
            except_hook: Box::new(report_failure),
            on_subcommand: None,
        }
    }

    /// Start with a copy of another context's aliases.
    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    /// Primary prompt used while this context is innermost, instead of `PS1`.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Handler for names that are not registered.
    pub fn with_default<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &Args) -> Result<Flow, CommandError> + 'static,
    {
        self.default = Rc::new(handler);
        self
    }

    pub fn with_except_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str, &mut dyn Ui) + 'static,
    {
        self.except_hook = Box::new(hook);
        self
    }

    pub fn on_subcommand<F>(mut self, hook: F) -> Self
    where
        F: FnMut(Option<Value>, &mut Environment, &mut dyn Ui) + 'static,
    {
        self.on_subcommand = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandSet {
        &mut self.commands
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    pub fn completion(&self) -> &CompletionScopes {
        &self.completion
    }

    pub fn completion_mut(&mut self) -> &mut CompletionScopes {
        &mut self.completion
    }

    /// Sorted canonical command names; names added with
    /// [`CommandSet::bind`] are left out.
    pub fn get_commands(&self) -> Vec<String> {
        self.commands.names().into_iter().map(str::to_owned).collect()
    }

    /// Pass the value a nested context quit with to the subcommand hook.
    pub fn handle_subcommand(
        &mut self,
        value: Option<Value>,
        env: &mut Environment,
        ui: &mut dyn Ui,
    ) {
        if let Some(hook) = self.on_subcommand.as_mut() {
            hook(value, env, ui);
        }
    }

    /// Dispatch one statement.
    ///
    /// Aliases are expanded, `!cmd` and `%cmd` are rewritten to `pipe cmd`
    /// and `spawn cmd`, `#...` is ignored. Errors are reported here; the
    /// returned [`Flow`] only tells the caller what to do next. A returned
    /// value is also stored in `$_` and `$?`.
    pub fn call(&mut self, argv: Vec<String>, env: &mut Environment, ui: &mut dyn Ui) -> Flow {
        match argv.first() {
            Some(head) if !head.is_empty() && !head.starts_with('_') => {}
            _ => return Flow::status(2),
        }

        let mut argv = self.aliases.expand(argv);
        let rewrite = match argv[0].chars().next() {
            Some('!') => Some("pipe"),
            Some('%') => Some("spawn"),
            Some('#') => return Flow::status(0),
            _ => None,
        };
        if let Some(target) = rewrite {
            argv[0].remove(0);
            if argv[0].is_empty() {
                argv.remove(0);
            }
            argv.insert(0, target.to_owned());
        }

        let (handler, usage) = match self.commands.lookup(&argv[0]) {
            Some(spec) => (spec.handler.clone(), spec.usage.clone()),
            None => (self.default.clone(), String::new()),
        };
        tracing::debug!(context = %self.name, command = %argv[0], "dispatch");

        let args = Args::new(argv);
        let result = {
            let mut cx = CallContext {
                env: &mut *env,
                ui: &mut *ui,
                aliases: &mut self.aliases,
                commands: &self.commands,
            };
            handler(&mut cx, &args)
        };

        let flow = match result {
            Ok(flow) => flow,
            Err(CommandError::Usage(msg)) => {
                ui.error(&format!("Syntax error: {msg}"));
                ui.help_local(&usage);
                Flow::status(2)
            }
            Err(CommandError::MissingArgument(_)) => {
                ui.error("Insufficient number of arguments.");
                ui.help_local(&usage);
                Flow::status(2)
            }
            Err(CommandError::Options(msg)) => {
                ui.error(&format!("option error: {msg}"));
                Flow::status(2)
            }
            Err(CommandError::Help(text)) => {
                ui.write(&text);
                Flow::status(0)
            }
            Err(CommandError::Failed(err)) => {
                tracing::debug!(command = %args.name(), error = %err, "command failed");
                (self.except_hook)(error_kind(&err), &format!("{err:#}"), ui);
                Flow::status(1)
            }
        };

        if let Flow::Continue(Some(value)) = &flow {
            env.set_var(LAST_STATUS, value.as_status().to_string());
            env.set_var(LAST_RESULT, value.to_string());
        }
        flow
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("commands", &self.commands)
            .field("aliases", &self.aliases)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}
