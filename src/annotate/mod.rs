//! Maps one unit's execution result onto line-addressed annotations.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
    execution::{ExecutionResult, Snapshot},
    segment::{scan::strip_comment, Mode, Unit},
    utils::unicode::clip,
};

/// How the renderer should present an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
    Value,
    Error,
    Waiting,
    Threading,
    Performance,
}

/// Text to display beside one source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub line: usize,
    pub text: String,
    pub style: StyleKind,
}

impl Annotation {
    pub fn new(line: usize, text: impl Into<String>, style: StyleKind) -> Self {
        Self { line, text: text.into(), style }
    }

    pub fn value(line: usize, text: impl Into<String>) -> Self {
        Self::new(line, text, StyleKind::Value)
    }

    pub fn error(line: usize, message: &str) -> Self {
        Self::new(line, format!(" ⚠ {}", message), StyleKind::Error)
    }
}

/// Syntactic shape of a marked line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Expression,
    PrintCall,
    Other,
}

/// The line with its trailing comment and surrounding whitespace removed.
pub fn clean_line(text: &str) -> &str {
    strip_comment(text.trim()).trim()
}

pub fn classify_line(text: &str) -> LineKind {
    let clean = clean_line(text);
    let is_expression = !clean.is_empty()
        && !clean.contains('=')
        && !["def ", "class ", "import ", "from ", "print"]
            .iter()
            .any(|p| clean.starts_with(p));
    if is_expression {
        LineKind::Expression
    } else if clean.contains("print") {
        LineKind::PrintCall
    } else {
        LineKind::Other
    }
}

/// `name: value` pairs of the last `count` bindings, each value clipped to `width`.
fn listing(vars: &Snapshot, count: usize, width: usize) -> String {
    vars.last(count)
        .iter()
        .map(|(k, v)| format!("{}: {}", k, clip(v, width)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Annotations for one unit under the given policy. Pure; performs no I/O.
pub fn annotate(
    result: &ExecutionResult,
    unit: &Unit,
    marked: &BTreeSet<usize>,
    mode: Mode,
) -> Vec<Annotation> {
    match mode {
        Mode::Explicit => annotate_explicit(result, unit, marked),
        Mode::Auto => annotate_auto(result, unit),
    }
}

fn annotate_explicit(result: &ExecutionResult, unit: &Unit, marked: &BTreeSet<usize>) -> Vec<Annotation> {
    let mut in_range = marked.range(unit.start_line..=unit.end_line).copied();

    if let Some(message) = result.error_message() {
        return in_range
            .next()
            .map(|line| vec![Annotation::error(line, message)])
            .unwrap_or_default();
    }

    in_range
        .filter_map(|line| {
            let text = unit.line(line)?;
            explicit_text(result, unit, line, text).map(|t| Annotation::value(line, t))
        })
        .collect()
}

fn explicit_text(result: &ExecutionResult, unit: &Unit, line: usize, text: &str) -> Option<String> {
    let vars = &result.variables;
    let clean = clean_line(text);

    match classify_line(text) {
        LineKind::Expression => {
            if let Some(value) = vars.get(clean) {
                Some(format!(" → {}", value))
            } else if let (Some(expr), true) = (&result.expression, line == unit.end_line) {
                Some(format!(" → {}", expr))
            } else if !vars.is_empty() {
                Some(format!(" // {}", listing(vars, 3, 30)))
            } else {
                None
            }
        }
        LineKind::PrintCall => {
            let logged = &result.print_outputs;
            let entry = match &result.output {
                Some(output) => {
                    let count = output.split('\n').count();
                    logged.get(count - 1).or_else(|| logged.last())
                }
                None => logged.last(),
            };
            entry.map(|p| format!(" ▶ {}", p.text))
        }
        LineKind::Other => {
            if vars.is_empty() {
                return None;
            }
            if let Some((lhs, _)) = clean.split_once('=') {
                let name = lhs.trim();
                if let Some(value) = vars.get(name) {
                    return Some(format!(" // {}: {}", name, value));
                }
            }
            Some(format!(" // {}", listing(vars, 3, 30)))
        }
    }
}

fn annotate_auto(result: &ExecutionResult, unit: &Unit) -> Vec<Annotation> {
    let line = unit.end_line;

    if let Some(message) = result.error_message() {
        return vec![Annotation::error(line, message)];
    }

    let mut out = Vec::new();
    if !result.variables.is_empty() {
        out.push(Annotation::value(line, format!(" // {}", listing(&result.variables, 5, 50))));
    }
    if let Some(expr) = &result.expression {
        out.push(Annotation::value(line, format!(" → {}", expr)));
    }
    if let Some(output) = &result.output {
        out.push(Annotation::value(line, format!(" ▶ {}", output)));
    }
    out
}
