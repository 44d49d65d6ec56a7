//! Lexical helpers for the segmenter: comment stripping, indentation and
//! multi-line construct tracking (brackets, backslashes, triple-quoted strings).

/// Indentation width of a line, counted in leading whitespace characters.
pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Return `line` up to (not including) the first `#` that is outside a string literal.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '#' => return &line[..i],
                '"' | '\'' => quote = Some(c),
                _ => {}
            },
        }
    }
    line
}

/// Tracks whether the lines fed so far leave a statement unfinished.
#[derive(Debug, Default, Clone)]
pub struct LineScanner {
    depth: usize,
    triple: Option<&'static str>,
    backslash: bool,
}

impl LineScanner {
    /// True while an opening bracket, a trailing backslash or a triple-quoted
    /// string is still waiting for its counterpart.
    pub fn continues(&self) -> bool {
        self.depth > 0 || self.triple.is_some() || self.backslash
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn feed(&mut self, line: &str) {
        self.backslash = false;
        let mut quote: Option<char> = None;
        let mut in_comment = false;
        let mut chars = line.char_indices();

        while let Some((i, c)) = chars.next() {
            if let Some(delim) = self.triple {
                if line[i..].starts_with(delim) {
                    self.triple = None;
                    chars.nth(1);
                } else if c == '\\' {
                    chars.next();
                }
                continue;
            }
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '#' => {
                    in_comment = true;
                    break;
                }
                '"' | '\'' => {
                    let delim = if c == '"' { "\"\"\"" } else { "'''" };
                    if line[i..].starts_with(delim) {
                        self.triple = Some(delim);
                        chars.nth(1);
                    } else {
                        quote = Some(c);
                    }
                }
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }

        if self.triple.is_none() && quote.is_none() && !in_comment {
            self.backslash = line.trim_end().ends_with('\\');
        }
    }
}
