//! `%`-escapes in prompt strings.
//!
//! | escape    | expands to                                  |
//! |-----------|---------------------------------------------|
//! | `%%`      | a literal `%`                               |
//! | `%n`      | newline                                     |
//! | `%u`      | `$USER` (or `$USERNAME`)                    |
//! | `%h`      | host name                                   |
//! | `%L`      | `$SHLVL`                                    |
//! | `%d`      | current directory                           |
//! | `%$`      | `#` for root, `>` otherwise                 |
//! | `%{NAME}` | value of `NAME`, or `NAME` itself if unset  |
//!
//! Color escapes (`%R`, `%g`, `%N`, `%[F12]`, ...) expand to nothing.
//! Any other `%x` expands to `x`.

use crate::env::{Environment, SHELL_LEVEL};
use crate::fsm::{ANY, Fsm, Machine, State, Transition};

const TEXT: State = 0;
const PERCENT: State = 1;
const VAR: State = 2;
const COLOR: State = 3;

const COLOR_LETTERS: &str = "IDNRGYBMCWrgybmcw";

struct Expansion<'a> {
    env: &'a Environment,
    out: String,
    varname: String,
}

impl Expansion<'_> {
    fn user(&self) -> &str {
        self.env
            .get_var("USER")
            .or_else(|| self.env.get_var("USERNAME"))
            .unwrap_or_default()
    }

    fn host(&self) -> String {
        if let Some(host) = self.env.get_var("HOSTNAME") {
            return host.to_owned();
        }
        std::fs::read_to_string("/etc/hostname")
            .map(|h| h.trim().to_owned())
            .unwrap_or_else(|_| "localhost".to_owned())
    }

    fn cwd(&self) -> String {
        if let Some(pwd) = self.env.get_var("PWD") {
            return pwd.to_owned();
        }
        std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default()
    }
}

fn add_text(x: &mut Expansion<'_>, c: char, _m: &mut Machine) {
    x.out.push(c);
}

fn escape(x: &mut Expansion<'_>, c: char, _m: &mut Machine) {
    match c {
        'n' => x.out.push('\n'),
        'u' => {
            let user = x.user().to_owned();
            x.out.push_str(&user);
        }
        'h' => {
            let host = x.host();
            x.out.push_str(&host);
        }
        'L' => {
            let level = x.env.get_var(SHELL_LEVEL).unwrap_or_default();
            x.out.push_str(level);
        }
        'd' => {
            let cwd = x.cwd();
            x.out.push_str(&cwd);
        }
        '$' => {
            let mark = if x.user() == "root" { '#' } else { '>' };
            x.out.push(mark);
        }
        c if COLOR_LETTERS.contains(c) => {}
        other => x.out.push(other),
    }
}

fn start_var(x: &mut Expansion<'_>, _c: char, _m: &mut Machine) {
    x.varname.clear();
}

fn var_char(x: &mut Expansion<'_>, c: char, _m: &mut Machine) {
    x.varname.push(c);
}

fn end_var(x: &mut Expansion<'_>, _c: char, _m: &mut Machine) {
    let name = std::mem::take(&mut x.varname);
    match x.env.get_var(&name) {
        Some(value) => x.out.push_str(value),
        None => x.out.push_str(&name),
    }
}

fn rules<'a>() -> Fsm<Expansion<'a>> {
    let mut fsm: Fsm<Expansion<'a>> = Fsm::new(TEXT);
    fsm.add_transition(ANY, TEXT, add_text, TEXT);
    fsm.add_jump('%', TEXT, PERCENT);

    fsm.add_transition(ANY, PERCENT, escape, TEXT);
    fsm.add_transition('{', PERCENT, start_var, VAR);
    fsm.add_jump('[', PERCENT, COLOR);

    fsm.insert(ANY, VAR, Transition::new(Some(var_char), None));
    fsm.add_transition('}', VAR, end_var, TEXT);

    fsm.insert(ANY, COLOR, Transition::new(None, None));
    fsm.add_jump(']', COLOR, TEXT);
    fsm
}

/// Expand the `%`-escapes in `template`.
pub fn expand_prompt(template: &str, env: &Environment) -> String {
    let mut fsm = rules();
    let mut x = Expansion {
        env,
        out: String::with_capacity(template.len()),
        varname: String::new(),
    };
    // Every state has a wildcard rule, so processing cannot fail.
    if fsm.process_str(template, &mut x).is_err() {
        return template.to_owned();
    }
    match fsm.current_state() {
        PERCENT => x.out.push('%'),
        VAR => {
            x.out.push_str("%{");
            x.out.push_str(&x.varname);
        }
        _ => {}
    }
    x.out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut env = Environment::new();
        env.inherit(vars.iter().copied());
        env
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(expand_prompt("> ", &env(&[])), "> ");
    }

    #[test]
    fn test_basic_escapes() {
        let e = env(&[("USER", "ann"), ("HOSTNAME", "box"), ("SHLVL", "2")]);
        assert_eq!(expand_prompt("%u@%h[%L]%$ ", &e), "ann@box[2]> ");
        assert_eq!(expand_prompt("100%%%n", &e), "100%\n");
    }

    #[test]
    fn test_root_marker() {
        assert_eq!(expand_prompt("%$", &env(&[("USER", "root")])), "#");
    }

    #[test]
    fn test_variables() {
        let e = env(&[("MODE", "edit")]);
        assert_eq!(expand_prompt("[%{MODE}]", &e), "[edit]");
        assert_eq!(expand_prompt("[%{NOPE}]", &e), "[NOPE]");
    }

    #[test]
    fn test_colors_vanish() {
        let e = env(&[("PWD", "/tmp")]);
        assert_eq!(expand_prompt("%G%d%N %[F208]x%[B4]", &e), "/tmp x");
    }

    #[test]
    fn test_unknown_and_dangling() {
        let e = env(&[]);
        assert_eq!(expand_prompt("%q", &e), "q");
        assert_eq!(expand_prompt("50%", &e), "50%");
        assert_eq!(expand_prompt("%{open", &e), "%{open");
    }
}
