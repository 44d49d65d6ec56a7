//! Block segmentation: turns line-indexed Python source into ordered evaluation units.

use std::{collections::BTreeSet, fmt, str::FromStr};

use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod scan;

use scan::{indent_of, strip_comment, LineScanner};

const COMPOUND_KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "else", "for", "while", "with", "try", "except", "finally",
];

const CONTINUATION_KEYWORDS: &[&str] = &["elif", "else", "except", "finally"];

/// Annotation policy, which also drives how marked lines are segmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Only lines carrying a marker are annotated.
    #[default]
    Explicit,
    /// Every unit is annotated at its last line.
    Auto,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Mode::Explicit),
            "auto" => Ok(Mode::Auto),
            other => bail!("unknown evaluation mode '{}' (expected explicit or auto)", other),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Explicit => f.write_str("explicit"),
            Mode::Auto => f.write_str("auto"),
        }
    }
}

/// Ordered literal substrings that flag a line for explicit-mode annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet(Vec<String>);

impl Default for MarkerSet {
    fn default() -> Self {
        Self(vec!["# ?".to_string(), "# /".to_string()])
    }
}

impl MarkerSet {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        )
    }

    /// Parse a comma separated list, e.g. `# ?,# /`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn is_marked(&self, line: &str) -> bool {
        self.0.iter().any(|m| line.contains(m.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Source text split into 0-based lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    lines: Vec<String>,
}

impl Document {
    pub fn from_text(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let lines = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Indices of every line containing at least one marker.
    pub fn marked_lines(&self, markers: &MarkerSet) -> BTreeSet<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| markers.is_marked(l))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Contiguous source lines evaluated as one incremental step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub start_line: usize,
    /// Inclusive.
    pub end_line: usize,
    pub code: String,
}

impl Unit {
    /// Lines of the unit paired with their document index.
    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.code
            .split('\n')
            .enumerate()
            .map(move |(offset, text)| (self.start_line + offset, text))
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        if index < self.start_line || index > self.end_line {
            return None;
        }
        self.code.split('\n').nth(index - self.start_line)
    }

    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Splits a document into units according to a mode and a marker set.
#[derive(Debug, Clone)]
pub struct Segmenter<'m> {
    mode: Mode,
    markers: &'m MarkerSet,
}

impl<'m> Segmenter<'m> {
    pub fn new(mode: Mode, markers: &'m MarkerSet) -> Self {
        Self { mode, markers }
    }

    pub fn segment<S: AsRef<str>>(&self, lines: &[S]) -> Vec<Unit> {
        let mut b = Builder::default();

        for (i, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            let trimmed = line.trim();
            let marked = self.markers.is_marked(line);

            // Unfinished brackets, strings or backslash continuations win over everything.
            if !b.buf.is_empty() && b.scan.continues() {
                b.push(i, line);
                continue;
            }

            if trimmed.is_empty() || (trimmed.starts_with('#') && !marked) {
                if !b.buf.is_empty() {
                    b.held.push((i, line));
                }
                continue;
            }

            let indent = indent_of(line);

            if let Some(base) = b.compound {
                if indent > base || (indent == base && is_continuation_clause(trimmed)) {
                    b.push(i, line);
                    continue;
                }
                b.flush();
            }

            if opens_compound(trimmed) {
                if !b.only_decorators() {
                    b.flush();
                }
                b.compound = Some(indent);
                b.push(i, line);
                continue;
            }

            if self.mode == Mode::Explicit && marked {
                b.flush();
                b.push(i, line);
                b.flush();
                continue;
            }

            if !b.buf.is_empty() && indent == 0 {
                b.flush();
            }
            b.push(i, line);
        }
        b.flush();

        debug!(units = b.units.len(), mode = %self.mode, "segmented document");
        b.units
    }
}

#[derive(Default)]
struct Builder<'a> {
    units: Vec<Unit>,
    buf: Vec<(usize, &'a str)>,
    held: Vec<(usize, &'a str)>,
    compound: Option<usize>,
    scan: LineScanner,
}

impl<'a> Builder<'a> {
    fn push(&mut self, index: usize, line: &'a str) {
        self.buf.append(&mut self.held);
        self.buf.push((index, line));
        self.scan.feed(line);
    }

    fn only_decorators(&self) -> bool {
        !self.buf.is_empty()
            && self
                .buf
                .iter()
                .all(|(_, l)| l.trim().is_empty() || l.trim_start().starts_with(['@', '#']))
    }

    fn flush(&mut self) {
        self.held.clear();
        self.compound = None;
        self.scan.reset();
        if let (Some(first), Some(last)) = (self.buf.first(), self.buf.last()) {
            let unit = Unit {
                start_line: first.0,
                end_line: last.0,
                code: self.buf.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n"),
            };
            debug!(start = unit.start_line, end = unit.end_line, "unit");
            self.units.push(unit);
        }
        self.buf.clear();
    }
}

fn first_word(code: &str) -> &str {
    let code = code.strip_prefix("async ").map(str::trim_start).unwrap_or(code);
    let end = code
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(code.len());
    &code[..end]
}

/// True when the trimmed line is a compound statement header such as `def f():`.
pub fn opens_compound(trimmed: &str) -> bool {
    let code = strip_comment(trimmed).trim_end();
    code.ends_with(':') && COMPOUND_KEYWORDS.contains(&first_word(code))
}

fn is_continuation_clause(trimmed: &str) -> bool {
    opens_compound(trimmed) && CONTINUATION_KEYWORDS.contains(&first_word(trimmed))
}
