//! Scope resolution at a cursor position
//!
//! The resolver walks the document from its first line to the target line,
//! threading the rule stack from each line into the next, and reads the
//! scope stack of the token under the cursor. There are no snapshots: each
//! call re-tokenizes every line up to the target.

use std::sync::Arc;

use embedscope_grammar::{Grammar, GrammarError, RuleStack, Token};
use tracing::{debug, error, warn};

use crate::document::{utf16_len, DocumentView, Position};
use crate::error::Result;
use crate::registry::GrammarRegistry;

/// Lines longer than this many UTF-16 code units are not tokenized
pub const DEFAULT_MAX_LINE_LENGTH: usize = 10_000;

/// Answers "which scopes apply at this position?"
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    registry: Arc<GrammarRegistry>,
    max_line_length: usize,
}

impl ScopeResolver {
    pub fn new(registry: Arc<GrammarRegistry>) -> Self {
        Self {
            registry,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn registry(&self) -> &Arc<GrammarRegistry> {
        &self.registry
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Scope stack at `position`, outermost first.
    ///
    /// Returns `None` when the grammar for `root_scope` is unavailable, the
    /// position lies beyond the document, or tokenization fails.
    pub async fn resolve_scopes_at<D>(
        &self,
        document: &D,
        position: Position,
        root_scope: &str,
    ) -> Option<Vec<String>>
    where
        D: DocumentView + ?Sized,
    {
        let grammar = self.registry.load_grammar(root_scope).await?;

        match walk_to(&grammar, document, position, root_scope, self.max_line_length) {
            Ok(scopes) => scopes,
            Err(e) => {
                error!("Failed to tokenize {} at {:?}: {}", root_scope, position, e);
                None
            }
        }
    }

    /// Tokens of every line of `document`.
    ///
    /// Oversized lines yield no tokens and leave the state untouched.
    pub async fn tokenize_document<D>(
        &self,
        document: &D,
        root_scope: &str,
    ) -> Result<Vec<Vec<Token>>>
    where
        D: DocumentView + ?Sized,
    {
        let grammar = self.registry.try_load_grammar(root_scope).await?;

        let mut state = RuleStack::initial();
        let mut lines = Vec::with_capacity(document.line_count());
        for index in 0..document.line_count() {
            let Some(text) = document.line_at(index) else {
                break;
            };
            if utf16_len(text) > self.max_line_length {
                warn!("Line {} is too long to tokenize, skipping", index);
                lines.push(Vec::new());
                continue;
            }
            let result = grammar.tokenize_line(text, &state)?;
            state = result.rule_stack;
            lines.push(result.tokens);
        }
        Ok(lines)
    }
}

/// Tokenize lines `0..=position.line` and pick the scopes at the cursor
fn walk_to<D>(
    grammar: &Grammar,
    document: &D,
    position: Position,
    root_scope: &str,
    max_line_length: usize,
) -> std::result::Result<Option<Vec<String>>, GrammarError>
where
    D: DocumentView + ?Sized,
{
    let mut state = RuleStack::initial();

    for index in 0..=position.line {
        let Some(text) = document.line_at(index) else {
            debug!(
                "Line {} is beyond the end of the document ({} lines)",
                index,
                document.line_count()
            );
            return Ok(None);
        };

        let length = utf16_len(text);
        if length > max_line_length {
            debug!("Skipping line {} ({} code units)", index, length);
            if index == position.line {
                return Ok(Some(vec![root_scope.to_string()]));
            }
            continue;
        }

        let result = grammar.tokenize_line(text, &state)?;
        if index == position.line {
            return Ok(Some(scopes_at(&result.tokens, position.character, root_scope)));
        }
        state = result.rule_stack;
    }

    Ok(None)
}

/// Scopes of the token covering `character` on a tokenized line.
///
/// Past the last token the last token's scopes apply; before the first
/// token, or on a line without tokens, only the root scope does.
pub fn scopes_at(tokens: &[Token], character: usize, root_scope: &str) -> Vec<String> {
    if let Some(token) = tokens.iter().find(|token| token.contains(character)) {
        return token.scopes.clone();
    }
    match tokens.last() {
        Some(last) if character >= last.end_index => last.scopes.clone(),
        _ => vec![root_scope.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(start: usize, end: usize, scope: &str) -> Token {
        Token {
            start_index: start,
            end_index: end,
            scopes: vec!["root".to_string(), scope.to_string()],
        }
    }

    #[test]
    fn test_scopes_at_half_open_ranges() {
        let tokens = vec![token(0, 3, "a"), token(3, 5, "b")];
        assert_eq!(scopes_at(&tokens, 0, "root")[1], "a");
        assert_eq!(scopes_at(&tokens, 2, "root")[1], "a");
        assert_eq!(scopes_at(&tokens, 3, "root")[1], "b");
    }

    #[test]
    fn test_scopes_at_past_last_token() {
        let tokens = vec![token(0, 3, "a"), token(3, 5, "b")];
        assert_eq!(scopes_at(&tokens, 5, "root")[1], "b");
        assert_eq!(scopes_at(&tokens, 50, "root")[1], "b");
    }

    #[test]
    fn test_scopes_at_zero_width_token() {
        let tokens = vec![token(0, 0, "a")];
        assert_eq!(scopes_at(&tokens, 0, "root")[1], "a");
    }

    #[test]
    fn test_scopes_at_without_tokens() {
        assert_eq!(scopes_at(&[], 0, "root"), vec!["root".to_string()]);
    }

    #[test]
    fn test_scopes_at_before_first_token() {
        let tokens = vec![token(2, 4, "a")];
        assert_eq!(scopes_at(&tokens, 1, "root"), vec!["root".to_string()]);
    }
}
