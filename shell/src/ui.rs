use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// Output side of the interpreter.
///
/// Commands never touch stdout directly; they go through a `Ui` so the same
/// command set can run against a terminal or an in-memory buffer.
pub trait Ui {
    /// Write `text` as-is.
    fn write(&mut self, text: &str);

    /// Write an error message on its own line.
    fn error(&mut self, text: &str);

    /// Write `text` followed by a newline.
    fn print(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
    }

    fn warning(&mut self, text: &str) {
        self.error(text);
    }

    /// Show a command's usage text, indented under the message that
    /// triggered it.
    fn help_local(&mut self, usage: &str) {
        for line in usage.lines() {
            if line.is_empty() {
                self.write("\n");
            } else {
                self.print(&format!("  {line}"));
            }
        }
    }
}

/// `Ui` over the process stdout and stderr.
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn write(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout is not something a command can act on.
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn error(&mut self, text: &str) {
        let _ = writeln!(io::stderr().lock(), "{text}");
    }
}

/// Memory-backed `Ui` for capturing output in tests and scripted runs.
pub struct MemoryUi {
    out: Rc<RefCell<String>>,
    err: Rc<RefCell<String>>,
}

impl MemoryUi {
    pub fn new() -> Self {
        Self {
            out: Rc::new(RefCell::new(String::new())),
            err: Rc::new(RefCell::new(String::new())),
        }
    }

    /// Create the ui together with shared handles to its stdout and stderr
    /// buffers, readable after the ui has been moved into an interpreter.
    pub fn with_handle() -> (Self, Rc<RefCell<String>>, Rc<RefCell<String>>) {
        let ui = Self::new();
        let out = ui.out.clone();
        let err = ui.err.clone();
        (ui, out, err)
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        self.out.borrow().clone()
    }

    /// Every error and warning so far, one per line.
    pub fn errors(&self) -> String {
        self.err.borrow().clone()
    }
}

impl Default for MemoryUi {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui for MemoryUi {
    fn write(&mut self, text: &str) {
        self.out.borrow_mut().push_str(text);
    }

    fn error(&mut self, text: &str) {
        let mut err = self.err.borrow_mut();
        err.push_str(text);
        err.push('\n');
    }
}
