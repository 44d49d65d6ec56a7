//! Python interpreter process bootstrap and I/O glue.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::debug;

use super::Interpreter;

const PROBE_SCRIPT: &str = r#"
import sys
import sysconfig
gil_disabled = sysconfig.get_config_var("Py_GIL_DISABLED")
print(f"GIL_DISABLED:{gil_disabled}")
print(f"VERSION:{sys.version}")
"#;

/// Spawn a fresh interpreter running `bootstrap` with every stream piped.
/// The child is killed if its handle is dropped before it exits.
pub fn start_python(interpreter: &Interpreter, bootstrap: &str) -> std::io::Result<Child> {
    let mut cmd = Command::new(interpreter.path());
    cmd.arg("-u") // unbuffered
        .arg("-c")
        .arg(bootstrap)
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(python = %interpreter, "spawning interpreter");
    cmd.spawn()
}

/// What the configured interpreter reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub version: String,
    /// True for free-threaded (no-GIL) builds.
    pub gil_disabled: bool,
}

impl InterpreterInfo {
    pub fn parse(output: &str) -> Self {
        let version = output
            .lines()
            .find_map(|l| l.strip_prefix("VERSION:"))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Self {
            version,
            gil_disabled: output.contains("GIL_DISABLED:1"),
        }
    }

    pub fn status_line(&self) -> String {
        if self.gil_disabled {
            format!(
                "Free-threaded Python (GIL disabled), true parallelism enabled: {}",
                self.version
            )
        } else {
            format!(
                "Standard Python (GIL enabled), threading limited to I/O parallelism: {}",
                self.version
            )
        }
    }
}

/// Ask the interpreter for its version and GIL configuration.
pub async fn probe(interpreter: &Interpreter) -> Result<InterpreterInfo> {
    let child = start_python(interpreter, PROBE_SCRIPT)
        .with_context(|| format!("failed to start interpreter {}", interpreter))?;
    let out = child
        .wait_with_output()
        .await
        .with_context(|| format!("failed to read from interpreter {}", interpreter))?;
    let info = InterpreterInfo::parse(&String::from_utf8_lossy(&out.stdout));
    debug!(version = %info.version, gil_disabled = info.gil_disabled, "probed interpreter");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_build() {
        let info = InterpreterInfo::parse("GIL_DISABLED:None\nVERSION:3.12.1 (main) [GCC]\n");
        assert!(!info.gil_disabled);
        assert_eq!(info.version, "3.12.1 (main) [GCC]");
        assert!(info.status_line().starts_with("Standard Python"));
    }

    #[test]
    fn test_parse_free_threaded_build() {
        let info = InterpreterInfo::parse("GIL_DISABLED:1\nVERSION:3.13.0t\n");
        assert!(info.gil_disabled);
        assert!(info.status_line().starts_with("Free-threaded"));
    }

    #[test]
    fn test_parse_garbage() {
        let info = InterpreterInfo::parse("");
        assert_eq!(info.version, "Unknown");
        assert!(!info.gil_disabled);
    }
}
