//! Execution engine: protocol and result types.

use std::{fmt, io, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::segment::opens_compound;

pub mod python;

/// Keywords that rule a single line out as a trailing-expression candidate.
const STATEMENT_KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "else", "for", "while", "with", "try", "import", "from",
    "return", "raise", "assert", "del", "pass", "break", "continue", "global", "nonlocal",
    "yield", "async",
];

/// Variables bound at top level after a run, in the order the interpreter bound them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(Vec<(String, String)>);

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The last `n` bindings, oldest first.
    pub fn last(&self, n: usize) -> &[(String, String)] {
        &self.0[self.0.len().saturating_sub(n)..]
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = Snapshot;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of variable names to their representations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    entries.push((k, v));
                }
                Ok(Snapshot(entries))
            }

            fn visit_unit<E>(self) -> Result<Snapshot, E> {
                Ok(Snapshot::default())
            }
        }

        deserializer.deserialize_any(SnapshotVisitor)
    }
}

/// One logged `print` call made by the evaluated program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOutput {
    pub index: usize,
    pub text: String,
}

/// Fixed-schema payload produced by one sandboxed execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub variables: Snapshot,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub print_outputs: Vec<PrintOutput>,
    /// Set when the failure came from the process boundary rather than the program.
    #[serde(skip)]
    pub fault: Option<ErrorClass>,
}

impl ExecutionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Classification of a failed run; `None` on success.
    pub fn error_class(&self) -> Option<ErrorClass> {
        if self.success {
            return None;
        }
        if let Some(fault) = &self.fault {
            return Some(fault.clone());
        }
        Some(ErrorClass::from_message(self.error.as_deref().unwrap_or_default()))
    }

    /// Error text to display for a failed run.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        Some(self.error.as_deref().unwrap_or("Evaluation failed"))
    }
}

/// Error taxonomy for a failed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    Syntax,
    Indentation,
    Name,
    Runtime,
    /// Any other exception, carrying its type name.
    Other(String),
    Timeout,
    Launch,
    Protocol,
}

impl ErrorClass {
    fn from_message(message: &str) -> Self {
        let (head, _) = message.split_once(':').unwrap_or((message, ""));
        match head {
            "Syntax Error" => ErrorClass::Syntax,
            "Indentation Error" => ErrorClass::Indentation,
            "Name Error" => ErrorClass::Name,
            "Runtime Error" => ErrorClass::Runtime,
            other => ErrorClass::Other(other.trim().to_string()),
        }
    }
}

/// Failures at the process boundary; each becomes a failed [`ExecutionResult`].
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Python process error: {0}")]
    Launch(#[source] io::Error),
    #[error("Python process I/O error: {0}")]
    Io(#[source] io::Error),
    #[error("Evaluation timeout ({})", format_timeout(.0))]
    Timeout(Duration),
    #[error("{0}")]
    Protocol(String),
}

impl SandboxError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SandboxError::Launch(_) | SandboxError::Io(_) => ErrorClass::Launch,
            SandboxError::Timeout(_) => ErrorClass::Timeout,
            SandboxError::Protocol(_) => ErrorClass::Protocol,
        }
    }
}

impl From<SandboxError> for ExecutionResult {
    fn from(err: SandboxError) -> Self {
        Self {
            fault: Some(err.class()),
            ..ExecutionResult::failure(err.to_string())
        }
    }
}

fn format_timeout(d: &Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}

/// Runs one unit's accumulated program and reports what happened.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, program: &str, unit_code: &str, end_line: usize) -> ExecutionResult;
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*\s*=\s*[^=]").expect("valid regex"))
}

/// The line worth re-evaluating as a trailing expression, if the unit is a
/// single bare statement.
pub fn trailing_expression_candidate(unit_code: &str) -> Option<&str> {
    let line = unit_code.trim();
    if line.is_empty() || line.contains('\n') || opens_compound(line) {
        return None;
    }
    let word_end = line
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    let rest = &line[word_end..];
    let is_keyword_statement = STATEMENT_KEYWORDS.contains(&&line[..word_end])
        && (rest.is_empty() || rest.starts_with(char::is_whitespace));
    if is_keyword_statement || assignment_re().is_match(line) {
        return None;
    }
    Some(line)
}
