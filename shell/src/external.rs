//! Running programs outside the interpreter (`pipe` and `spawn`).

use crate::command::ExitCode;
use crate::env::Environment;
use anyhow::{Context, Result, bail};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Exit code of a child killed by SIGINT.
pub const INTERRUPTED: ExitCode = 130;

/// Build a `Command` for `argv`, resolved against the interpreter's `PATH`
/// and run with exactly the interpreter's variables.
fn prepare(argv: &[String], env: &Environment) -> Result<Command> {
    let Some(name) = argv.first() else {
        bail!("no program given");
    };
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let program = find_command_path(OsStr::new(search_paths), Path::new(name))
        .with_context(|| format!("{name}: command not found"))?;

    let mut cmd = Command::new(&*program);
    cmd.args(&argv[1..]).env_clear().envs(env.iter());
    Ok(cmd)
}

fn exit_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or_else(|| terminated_by_signal(status))
}

/// Run `argv` and collect its standard output. Stdin and stderr stay
/// connected to the terminal.
pub fn run_captured(argv: &[String], env: &Environment) -> Result<(ExitCode, String)> {
    let output = prepare(argv, env)?
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("{}: failed to run", argv[0]))?;
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    Ok((exit_code(output.status), text))
}

/// Run `argv` attached to the terminal and wait for it.
pub fn run_inherited(argv: &[String], env: &Environment) -> Result<ExitCode> {
    let status = prepare(argv, env)?
        .status()
        .with_context(|| format!("{}: failed to run", argv[0]))?;
    Ok(exit_code(status))
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> ExitCode {
    -1
}

/// Resolve a program name the way a shell does.
///
/// Absolute paths and paths with several components are used as given when
/// they exist. A bare name is searched for in each directory of
/// `search_paths`. `./name` (or any name, off unix) is also tried relative to
/// the current directory.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) => find_in_path(search_paths, single.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.exists())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_env() -> Environment {
        let mut env = Environment::new();
        env.set_var("PATH", "/bin:/usr/bin");
        env
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_is_found() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(OsStr::new("/bin"), path).expect("absolute /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_missing_is_none() {
        let res = find_command_path(OsStr::new("/bin"), Path::new("/bin/nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn bare_name_searches_path() {
        let found = find_command_path(OsStr::new("/nowhere:/bin"), Path::new("sh"))
            .expect("sh in /bin");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
        assert!(find_command_path(OsStr::new("/bin"), Path::new("nonexisting")).is_none());
    }

    #[test]
    fn several_components_are_relative_to_current_dir() {
        let found = find_command_path(OsStr::new("/nowhere"), Path::new("src/lib.rs"));
        assert!(found.is_some());
        assert!(find_command_path(OsStr::new("/nowhere"), Path::new("src/nope.rs")).is_none());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(OsStr::new("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn captured_output_and_status() {
        let (code, out) = run_captured(&argv(&["echo", "hi", "there"]), &path_env()).unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, "hi there\n");

        let (code, _) = run_captured(&argv(&["sh", "-c", "exit 3"]), &path_env()).unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    #[cfg(unix)]
    fn child_sees_only_interpreter_variables() {
        let mut env = path_env();
        env.set_var("GREETING", "hello");
        let (_, out) = run_captured(&argv(&["sh", "-c", "echo $GREETING"]), &env).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    #[cfg(unix)]
    fn signal_exit_is_128_plus_signal() {
        let (code, _) = run_captured(&argv(&["sh", "-c", "kill -TERM $$"]), &path_env()).unwrap();
        assert_eq!(code, 128 + 15);
    }

    #[test]
    fn unknown_program_is_error() {
        let err = run_captured(&argv(&["no-such-program-xyz"]), &path_env()).unwrap_err();
        assert!(err.to_string().contains("command not found"));
    }
}
