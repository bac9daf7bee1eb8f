use anyhow::Context;
use argh::FromArgs;
use command_shell::{
    Args, CallContext, CommandError, CommandSet, Console, ConsoleUi, Controller, Environment,
    Flow, Interpreter,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Interactive command interpreter.
#[derive(FromArgs)]
struct Cli {
    /// run these statements and exit
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// primary prompt template, stored in PS1
    #[argh(option)]
    prompt: Option<String>,

    /// start with an empty environment
    #[argh(switch)]
    no_inherit: bool,

    /// script to run instead of reading the terminal
    #[argh(positional)]
    script: Option<PathBuf>,
}

const NEST_USAGE: &str = "Usage: nest [name]

Start a nested session with the standard commands. `exit [value]` returns
to this one and hands it the value.";

fn nest(_cx: &mut CallContext<'_>, args: &Args) -> Result<Flow, CommandError> {
    let name = args.get_or(1, "nested").to_owned();
    let child = Controller::new(name.clone(), session_commands())
        .with_prompt(format!("({name}) [%L]%$ "));
    Ok(Flow::Push(Box::new(child)))
}

fn session_commands() -> CommandSet {
    let mut commands = CommandSet::with_builtins();
    if let Err(err) = commands.register("nest", NEST_USAGE, nest) {
        tracing::error!(%err, "nest command not installed");
    }
    commands
}

fn main_session() -> Controller {
    Controller::new("main", session_commands()).on_subcommand(|value, _env, ui| {
        if let Some(value) = value {
            ui.print(&format!("nested session returned {value}"));
        }
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli: Cli = argh::from_env();

    let mut env = if cli.no_inherit {
        Environment::new()
    } else {
        Environment::from_system()
    };
    if let Some(prompt) = cli.prompt {
        env.set_var("PS1", prompt);
    }

    let mut sh = Interpreter::new(env, Box::new(ConsoleUi));
    sh.push_context(main_session());

    if let Some(commands) = cli.command {
        if let Err(halt) = sh.run_line(&commands) {
            tracing::debug!(?halt, "command string stopped");
        }
        return Ok(());
    }

    if let Some(path) = cli.script {
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        return sh.parse_reader(BufReader::new(file));
    }

    let mut console = Console::new().context("starting the line editor")?;
    sh.interact(&mut console)
}
