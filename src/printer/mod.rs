//! Printers: annotated source listing for terminals and JSON for tools.

use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use unicode_width::UnicodeWidthStr;

use crate::{
    annotate::{Annotation, StyleKind},
    driver::CycleObserver,
    segment::{Document, Unit},
};

/// Paint `text` for `style`, or return it untouched when colour is off.
pub fn paint(text: &str, style: StyleKind, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match style {
        StyleKind::Value => text.green().to_string(),
        StyleKind::Error => text.red().to_string(),
        StyleKind::Waiting => text.yellow().to_string(),
        StyleKind::Threading => text.magenta().to_string(),
        StyleKind::Performance => text.cyan().to_string(),
    }
}

/// Prints the document with line numbers and each line's annotations in one column.
pub struct AnnotatedPrinter {
    pub color: bool,
}

impl AnnotatedPrinter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colour only when stdout is a terminal.
    pub fn detect() -> Self {
        Self::new(io::stdout().is_terminal())
    }

    pub fn render(&self, doc: &Document, annotations: &[Annotation]) -> String {
        let mut by_line: BTreeMap<usize, Vec<&Annotation>> = BTreeMap::new();
        for a in annotations.iter().filter(|a| a.line < doc.len()) {
            by_line.entry(a.line).or_default().push(a);
        }

        let number_width = doc.len().max(1).to_string().len();
        let column = by_line
            .keys()
            .filter_map(|&i| doc.line(i))
            .map(UnicodeWidthStr::width)
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for (i, line) in doc.lines().iter().enumerate() {
            let number = format!("{:>w$}", i + 1, w = number_width);
            if self.color {
                out.push_str(&number.dimmed().to_string());
            } else {
                out.push_str(&number);
            }
            out.push_str(" | ");
            out.push_str(line);
            if let Some(notes) = by_line.get(&i) {
                let pad = column.saturating_sub(line.width());
                out.push_str(&" ".repeat(pad));
                for note in notes {
                    out.push_str(&paint(&note.text, note.style, self.color));
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn print(&self, doc: &Document, annotations: &[Annotation]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(self.render(doc, annotations).as_bytes())?;
        stdout.flush()
    }

    /// One styled status line, e.g. the interpreter's GIL status.
    pub fn status(&self, text: &str, style: StyleKind) {
        println!("{}", paint(text, style, self.color));
    }
}

/// Prints one JSON array of annotations per cycle.
pub struct JsonPrinter;

impl JsonPrinter {
    pub fn render(&self, annotations: &[Annotation]) -> serde_json::Result<String> {
        serde_json::to_string(annotations)
    }

    pub fn print(&self, annotations: &[Annotation]) -> anyhow::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", self.render(annotations)?)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Shows transient progress on stderr while units run.
pub struct ProgressReporter {
    color: bool,
}

impl ProgressReporter {
    pub fn detect() -> Self {
        Self { color: io::stderr().is_terminal() }
    }
}

impl CycleObserver for ProgressReporter {
    fn unit_started(&mut self, index: usize, total: usize, unit: &Unit, waiting: Option<&Annotation>) {
        let Some(waiting) = waiting else { return };
        let line = format!("[{}/{}] line {}:{}", index + 1, total, unit.end_line + 1, waiting.text);
        eprintln!("{}", paint(&line, waiting.style, self.color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_aligns_annotations() {
        let doc = Document::from_text("x = 1\nlonger_name = 2  # ?\ny = 3");
        let annotations = vec![
            Annotation::value(0, " → 1"),
            Annotation::value(1, " → 2"),
        ];
        let out = AnnotatedPrinter::new(false).render(&doc, &annotations);
        let expected = format!(
            "1 | x = 1{} → 1\n2 | longer_name = 2  # ? → 2\n3 | y = 3\n",
            " ".repeat(15)
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_render_joins_annotations_on_same_line() {
        let doc = Document::from_text("f()");
        let annotations = vec![
            Annotation::value(0, " → 3"),
            Annotation::new(0, " ⏱ 12 ms", StyleKind::Performance),
        ];
        let out = AnnotatedPrinter::new(false).render(&doc, &annotations);
        assert_eq!(out, "1 | f() → 3 ⏱ 12 ms\n");
    }

    #[test]
    fn test_render_ignores_out_of_range_lines() {
        let doc = Document::from_text("a = 1");
        let out = AnnotatedPrinter::new(false).render(&doc, &[Annotation::value(7, " → 1")]);
        assert_eq!(out, "1 | a = 1\n");
    }

    #[test]
    fn test_wide_characters_are_aligned_by_display_width() {
        let doc = Document::from_text("s = '日本'\nt = 'ab'");
        let annotations = vec![Annotation::value(0, " → x"), Annotation::value(1, " → y")];
        let out = AnnotatedPrinter::new(false).render(&doc, &annotations);
        assert_eq!(out, "1 | s = '日本' → x\n2 | t = 'ab'   → y\n");
    }

    #[test]
    fn test_paint_without_color_is_identity() {
        assert_eq!(paint(" ⚠ boom", StyleKind::Error, false), " ⚠ boom");
        assert_ne!(paint(" ⚠ boom", StyleKind::Error, true), " ⚠ boom");
    }

    #[test]
    fn test_json_printer_shape() {
        let json = JsonPrinter.render(&[Annotation::error(2, "Name Error: name 'q' is not defined")]).unwrap();
        assert_eq!(
            json,
            r#"[{"line":2,"text":" ⚠ Name Error: name 'q' is not defined","style":"error"}]"#
        );
    }
}
