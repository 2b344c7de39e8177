//! Pattern and scope-name rewriting
//!
//! Scope names may refer to capture groups (`$1`, `${2:/downcase}`), `end` and
//! `while` patterns may refer to groups of their `begin` match (`\1`), and the
//! `\A` / `\G` anchors are switched off by rewriting them to a character that
//! never occurs in a line.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::scanner::CaptureIndices;

/// Stand-in for a disabled anchor
const NEVER: char = '\u{FFFF}';

fn capture_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(\d+)|\$\{(\d+):/(downcase|upcase)\}").expect("capture reference pattern")
    })
}

fn back_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\(\d+)").expect("back-reference pattern"))
}

/// A `name` or `contentName` value, possibly referring to capture groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScopeName {
    raw: String,
    has_captures: bool,
}

impl ScopeName {
    pub(crate) fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            has_captures: capture_reference_re().is_match(raw),
        }
    }

    /// Substitute capture references using the text of `line`
    pub(crate) fn resolve(&self, line: &str, captures: &CaptureIndices) -> String {
        if !self.has_captures {
            return self.raw.clone();
        }

        capture_reference_re()
            .replace_all(&self.raw, |caps: &Captures| {
                let group = caps.get(1).or_else(|| caps.get(2));
                let captured = group
                    .and_then(|g| g.as_str().parse::<usize>().ok())
                    .and_then(|i| captures.get(i).copied().flatten())
                    .and_then(|(start, end)| line.get(start..end));

                let Some(text) = captured else {
                    return caps[0].to_string();
                };
                let text = text.trim_start_matches('.');
                match caps.get(3).map(|m| m.as_str()) {
                    Some("downcase") => text.to_lowercase(),
                    Some("upcase") => text.to_uppercase(),
                    _ => text.to_string(),
                }
            })
            .into_owned()
    }
}

/// Append the space-separated scopes of `name` to `base`
pub(crate) fn push_scopes(base: &[String], name: Option<String>) -> Vec<String> {
    let mut scopes = base.to_vec();
    if let Some(name) = name {
        scopes.extend(name.split_whitespace().map(str::to_string));
    }
    scopes
}

/// Whether an `end`/`while` pattern refers to groups of its `begin` match
pub(crate) fn has_back_references(pattern: &str) -> bool {
    back_reference_re().is_match(pattern)
}

/// Replace `\N` in `pattern` with the escaped text of group N of the begin match
pub(crate) fn resolve_back_references(
    pattern: &str,
    line: &str,
    captures: &CaptureIndices,
) -> String {
    back_reference_re()
        .replace_all(pattern, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| captures.get(i).copied().flatten())
                .and_then(|(start, end)| line.get(start..end))
                .map(escape_pattern)
                .unwrap_or_default()
        })
        .into_owned()
}

fn escape_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if matches!(
            ch,
            '-' | '\\'
                | '{'
                | '}'
                | '*'
                | '+'
                | '?'
                | '|'
                | '^'
                | '$'
                | '.'
                | ','
                | '['
                | ']'
                | '('
                | ')'
                | '#'
        ) || ch.is_whitespace()
        {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Whether `source` uses the `\A` or `\G` anchors
pub(crate) fn has_anchor(source: &str) -> bool {
    let mut chars = source.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some('A' | 'G') = chars.next() {
                return true;
            }
        }
    }
    false
}

/// Rewrite the anchors of `source` that are not active at the current position
pub(crate) fn resolve_anchors(source: &str, allow_a: bool, allow_g: bool) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('A') if !allow_a => out.push(NEVER),
            Some('G') if !allow_g => out.push(NEVER),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}
