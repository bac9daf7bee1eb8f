//! Building blocks for interactive, shell-like command interpreters.
//!
//! Input is tokenized character by character by a table-driven [`Lexer`]
//! that understands quoting, escapes and `$NAME` references, so a statement
//! may span several lines. Each finished statement goes to the innermost
//! [`Controller`] on the [`Interpreter`]'s context stack, which expands
//! aliases, looks the command up in its [`CommandSet`] and turns errors into
//! reports. Commands answer with a [`Flow`] that can keep going, quit the
//! context with a value, push a nested context or leave altogether.
//!
//! [`CommandSet::with_builtins`] provides the standard commands (`echo`,
//! `printenv`, `export`, `unset`, `setenv`, `help`, `alias`, `unalias`,
//! `exit`, `pipe` and `spawn`). Output always goes through a [`Ui`], and
//! terminal input through a [`LineReader`] such as [`Console`].

pub mod alias;
mod builtin;
pub mod command;
pub mod completion;
pub mod console;
pub mod controller;
pub mod env;
mod external;
pub mod fsm;
pub mod interpreter;
pub mod lexer;
pub mod prompt;
pub mod ui;

pub use alias::AliasTable;
pub use command::{Args, CallContext, CommandError, CommandSet, Flow, Value};
pub use completion::CompletionScopes;
pub use console::Console;
pub use controller::Controller;
pub use env::Environment;
pub use interpreter::{Halt, Input, Interpreter, LineReader, ReadLine};
pub use lexer::Lexer;
pub use ui::{ConsoleUi, MemoryUi, Ui};
