//! Scanner backend adapter
//!
//! The tokenizer never talks to a regex engine directly. It asks a
//! [`ScannerLib`] to compile pattern lists into [`Matcher`]s and to wrap each
//! line into a [`MatchLine`]. [`OnigLib`] is the Oniguruma implementation;
//! TextMate grammars are written against Oniguruma syntax (`\G`, `\h`,
//! possessive quantifiers, look-behind), so that is the engine used in
//! production.

use std::fmt;

use onig::{Regex, RegexOptions, Region, SearchOptions, Syntax};

use crate::error::{GrammarError, Result};

/// Capture group positions as byte ranges into the matched line.
/// Index 0 is the whole match; unmatched groups are `None`.
pub type CaptureIndices = Vec<Option<(usize, usize)>>;

/// Pattern-matching backend used to compile grammar patterns
pub trait ScannerLib: Send + Sync + fmt::Debug {
    /// Compile `sources` into a matcher that reports the earliest match
    /// among them.
    fn compile_patterns(&self, sources: &[String]) -> Result<Box<dyn Matcher>>;

    /// Wrap a line of document text for repeated matching.
    fn wrap_line(&self, text: &str) -> MatchLine {
        MatchLine::new(text)
    }
}

/// A compiled list of patterns
pub trait Matcher: Send + Sync {
    /// Find the match starting earliest at or after byte `start`.
    ///
    /// When several patterns match at the same position the one listed first
    /// wins.
    fn find_next_match(&self, line: &MatchLine, start: usize) -> Option<ScanMatch>;
}

/// Result of a successful [`Matcher::find_next_match`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMatch {
    /// Index of the winning pattern in the compiled list
    pub index: usize,
    /// Capture positions of the winning pattern
    pub captures: CaptureIndices,
}

impl ScanMatch {
    /// Byte offset where the whole match starts
    pub fn start(&self) -> usize {
        self.captures
            .first()
            .copied()
            .flatten()
            .map_or(0, |(start, _)| start)
    }

    /// Byte offset where the whole match ends
    pub fn end(&self) -> usize {
        self.captures
            .first()
            .copied()
            .flatten()
            .map_or(0, |(_, end)| end)
    }
}

/// A line prepared for matching.
///
/// Grammars expect every line to end with `\n`, so one is appended. Matching
/// works on UTF-8 byte offsets while callers speak UTF-16 code units; the
/// conversion table is only built for lines containing non-ASCII text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchLine {
    text: String,
    content_len: usize,
    utf16: Option<Vec<usize>>,
}

impl MatchLine {
    /// Wrap `content`, appending the trailing newline
    pub fn new(content: &str) -> Self {
        let mut text = String::with_capacity(content.len() + 1);
        text.push_str(content);
        text.push('\n');
        Self::from_text(text, content.len())
    }

    fn from_text(text: String, content_len: usize) -> Self {
        let utf16 = if text.is_ascii() {
            None
        } else {
            let mut table = Vec::with_capacity(text.len() + 1);
            let mut units = 0;
            for ch in text.chars() {
                for _ in 0..ch.len_utf8() {
                    table.push(units);
                }
                units += ch.len_utf16();
            }
            table.push(units);
            Some(table)
        };

        Self {
            text,
            content_len,
            utf16,
        }
    }

    /// The matchable text, including the trailing newline
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in bytes, including the trailing newline
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the line has no text at all (not even the newline)
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in bytes of the original content, without the newline
    pub fn content_len(&self) -> usize {
        self.content_len
    }

    /// Convert a byte offset into a UTF-16 code unit offset
    pub fn utf16_offset(&self, byte: usize) -> usize {
        match &self.utf16 {
            None => byte,
            Some(table) => table
                .get(byte)
                .copied()
                .unwrap_or_else(|| table.last().copied().unwrap_or(0)),
        }
    }

    /// The first `end` bytes as a line of their own, without a newline.
    ///
    /// Used to re-tokenize a capture group in place: offsets stay the same as
    /// in the full line.
    pub fn prefix(&self, end: usize) -> MatchLine {
        let end = end.min(self.text.len());
        let text = self.text[..end].to_string();
        let content_len = end.min(self.content_len);
        Self::from_text(text, content_len)
    }
}

/// Oniguruma-backed [`ScannerLib`]
#[derive(Debug, Default, Clone, Copy)]
pub struct OnigLib;

impl OnigLib {
    pub fn new() -> Self {
        Self
    }

    /// Version string of the linked Oniguruma library
    pub fn version() -> String {
        onig::version()
    }
}

impl ScannerLib for OnigLib {
    fn compile_patterns(&self, sources: &[String]) -> Result<Box<dyn Matcher>> {
        let regexes = sources
            .iter()
            .map(|source| {
                Regex::with_options(
                    source,
                    RegexOptions::REGEX_OPTION_CAPTURE_GROUP,
                    Syntax::default(),
                )
                .map_err(|e| GrammarError::InvalidPattern {
                    pattern: source.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(OnigMatcher { regexes }))
    }
}

struct OnigMatcher {
    regexes: Vec<Regex>,
}

impl Matcher for OnigMatcher {
    fn find_next_match(&self, line: &MatchLine, start: usize) -> Option<ScanMatch> {
        let text = line.as_str();
        if start > text.len() {
            return None;
        }

        let mut best: Option<ScanMatch> = None;
        for (index, regex) in self.regexes.iter().enumerate() {
            let mut region = Region::new();
            if regex
                .search_with_options(
                    text,
                    start,
                    text.len(),
                    SearchOptions::SEARCH_OPTION_NONE,
                    Some(&mut region),
                )
                .is_none()
            {
                continue;
            }
            let Some((match_start, _)) = region.pos(0) else {
                continue;
            };

            if best.as_ref().map_or(true, |b| match_start < b.start()) {
                best = Some(ScanMatch {
                    index,
                    captures: (0..region.len()).map(|i| region.pos(i)).collect(),
                });
                // Nothing can start earlier than the search position
                if match_start == start {
                    break;
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(sources: &[&str]) -> Box<dyn Matcher> {
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        OnigLib::new().compile_patterns(&sources).unwrap()
    }

    #[test]
    fn test_earliest_match_wins() {
        let matcher = compile(&["world", "hello"]);
        let line = MatchLine::new("hello world");

        let found = matcher.find_next_match(&line, 0).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!((found.start(), found.end()), (0, 5));
    }

    #[test]
    fn test_tie_goes_to_first_pattern() {
        let matcher = compile(&["hel", "hello"]);
        let line = MatchLine::new("hello");

        let found = matcher.find_next_match(&line, 0).unwrap();
        assert_eq!(found.index, 0);
    }

    #[test]
    fn test_search_starts_at_offset() {
        let matcher = compile(&["o"]);
        let line = MatchLine::new("foo bar");

        assert_eq!(matcher.find_next_match(&line, 2).unwrap().start(), 2);
        assert_eq!(matcher.find_next_match(&line, 3), None);
    }

    #[test]
    fn test_g_anchor_matches_at_search_start() {
        let matcher = compile(&[r"\Gb"]);
        let line = MatchLine::new("abc");

        assert!(matcher.find_next_match(&line, 1).is_some());
        assert!(matcher.find_next_match(&line, 0).is_none());
    }

    #[test]
    fn test_captures_are_reported() {
        let matcher = compile(&[r"(a)(x)?(b)"]);
        let line = MatchLine::new("zab");

        let found = matcher.find_next_match(&line, 0).unwrap();
        assert_eq!(
            found.captures,
            vec![Some((1, 3)), Some((1, 2)), None, Some((2, 3))]
        );
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let err = OnigLib::new()
            .compile_patterns(&["(unclosed".to_string()])
            .err()
            .unwrap();
        assert!(matches!(err, GrammarError::InvalidPattern { .. }));
    }

    #[test]
    fn test_match_line_appends_newline() {
        let line = MatchLine::new("abc");
        assert_eq!(line.as_str(), "abc\n");
        assert_eq!(line.len(), 4);
        assert_eq!(line.content_len(), 3);
    }

    #[test]
    fn test_utf16_offsets() {
        // 'é' is 2 bytes / 1 unit, '😀' is 4 bytes / 2 units
        let line = MatchLine::new("é😀x");
        assert_eq!(line.utf16_offset(0), 0);
        assert_eq!(line.utf16_offset(2), 1);
        assert_eq!(line.utf16_offset(6), 3);
        assert_eq!(line.utf16_offset(7), 4);
        assert_eq!(line.utf16_offset(8), 5);
    }

    #[test]
    fn test_prefix_keeps_offsets() {
        let line = MatchLine::new("abcdef");
        let prefix = line.prefix(3);
        assert_eq!(prefix.as_str(), "abc");
        assert_eq!(prefix.content_len(), 3);
    }
}
