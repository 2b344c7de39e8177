//! Read-only document access

use serde::{Deserialize, Serialize};

/// A cursor position: 0-based line and 0-based UTF-16 column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// Line-indexed view of a document
pub trait DocumentView {
    fn line_count(&self) -> usize;

    /// Text of line `index` without its terminator
    fn line_at(&self, index: usize) -> Option<&str>;
}

impl<S: AsRef<str>> DocumentView for [S] {
    fn line_count(&self) -> usize {
        self.len()
    }

    fn line_at(&self, index: usize) -> Option<&str> {
        self.get(index).map(AsRef::as_ref)
    }
}

impl<S: AsRef<str>> DocumentView for Vec<S> {
    fn line_count(&self) -> usize {
        self.as_slice().line_count()
    }

    fn line_at(&self, index: usize) -> Option<&str> {
        self.as_slice().line_at(index)
    }
}

/// A document built from full text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextDocument {
    lines: Vec<String>,
}

impl TextDocument {
    /// Split `text` into lines on `\n`, dropping a `\r` before it.
    ///
    /// A trailing newline yields a final empty line, as in an editor.
    pub fn new(text: &str) -> Self {
        Self {
            lines: text
                .split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
                .collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl DocumentView for TextDocument {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_at(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }
}

/// Length of `text` in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}
