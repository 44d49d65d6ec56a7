//! Incremental live evaluation of Python source with inline annotations.

pub mod annotate;
pub mod cli;
pub mod config;
pub mod driver;
pub mod execution;
pub mod printer;
pub mod process;
pub mod segment;
pub mod utils;

pub use annotate::{Annotation, StyleKind};
pub use config::EvalSettings;
pub use driver::{CycleOutcome, Driver};
pub use execution::{python::PythonSandbox, ExecutionResult, Executor};
