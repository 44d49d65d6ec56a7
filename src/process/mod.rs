//! Interpreter process management (startup/IO/probing).

use std::fmt;

pub mod python;

/// Path of the interpreter executable, consumed verbatim when spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter(String);

impl Interpreter {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(default_python())
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}
