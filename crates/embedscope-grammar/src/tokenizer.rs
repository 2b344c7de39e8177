//! Line tokenizer
//!
//! Follows the vscode-textmate scanning loop: at every position the patterns
//! of the rule on top of the stack compete with that rule's `end` pattern,
//! the earliest match wins, and the stack is pushed or popped accordingly.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use crate::error::Result;
use crate::grammar::Grammar;
use crate::names::{push_scopes, resolve_back_references};
use crate::rule::{BeginEndRule, CaptureRule, PatternSet, Rule, RuleId};
use crate::scanner::{CaptureIndices, MatchLine, Matcher, ScanMatch};
use crate::stack::{Frames, RuleStack, StackFrame};

/// A run of characters on one line sharing the same scopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// First UTF-16 code unit of the token
    pub start_index: usize,
    /// One past the last UTF-16 code unit of the token
    pub end_index: usize,
    /// Scope names from the grammar root to the innermost rule
    pub scopes: Vec<String>,
}

impl Token {
    /// Whether `character` falls inside `[start_index, end_index)`
    pub fn contains(&self, character: usize) -> bool {
        self.start_index <= character && character < self.end_index
    }
}

/// Result of tokenizing one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens {
    pub tokens: Vec<Token>,
    /// State to pass in when tokenizing the next line
    pub rule_stack: RuleStack,
}

/// Token with byte offsets, before conversion to UTF-16
#[derive(Debug, Clone)]
struct ByteToken {
    start: usize,
    end: usize,
    scopes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct TokenAccumulator {
    tokens: Vec<ByteToken>,
    /// Where the next token starts
    last_end: usize,
}

impl TokenAccumulator {
    fn starting_at(pos: usize) -> Self {
        Self {
            tokens: Vec::new(),
            last_end: pos,
        }
    }

    fn produce(&mut self, end: usize, scopes: &[String]) {
        // Zero-width matches produce nothing
        if self.last_end >= end {
            return;
        }
        self.tokens.push(ByteToken {
            start: self.last_end,
            end,
            scopes: scopes.to_vec(),
        });
        self.last_end = end;
    }

    /// Drop the appended newline and convert offsets to UTF-16.
    /// An empty line keeps one zero-width token with the scopes open at
    /// its end.
    fn finish(mut self, line: &MatchLine) -> Vec<Token> {
        let len = line.len();
        if self.tokens.last().is_some_and(|t| t.start + 1 == len) {
            if let Some(newline) = self.tokens.pop() {
                if self.tokens.is_empty() {
                    self.tokens.push(ByteToken {
                        start: 0,
                        end: line.content_len(),
                        scopes: newline.scopes,
                    });
                }
            }
        }
        if let Some(last) = self.tokens.last_mut() {
            if last.end == len {
                last.end = line.content_len();
            }
        }

        self.tokens
            .into_iter()
            .map(|t| Token {
                start_index: line.utf16_offset(t.start),
                end_index: line.utf16_offset(t.end),
                scopes: t.scopes,
            })
            .collect()
    }
}

enum Matched<'g> {
    /// The `end` pattern of the rule on top of the stack
    End(&'g BeginEndRule),
    Rule(RuleId),
}

/// Tokenizes a single line against one grammar
pub(crate) struct LineTokenizer<'g> {
    grammar: &'g Grammar,
    /// `end`/`while` patterns whose back-references were filled in
    dynamic: HashMap<String, PatternSet>,
}

impl<'g> LineTokenizer<'g> {
    pub(crate) fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            dynamic: HashMap::new(),
        }
    }

    pub(crate) fn tokenize_line(&mut self, text: &str, prev: &RuleStack) -> Result<LineTokens> {
        let is_first_line = prev.is_initial();
        let frames = if is_first_line {
            vec![StackFrame::root(self.grammar.root(), self.grammar.scope_name())]
        } else {
            prev.frames_for_next_line()
        };

        let line = self.grammar.lib().wrap_line(text);
        let (acc, frames) = self.tokenize(&line, Frames::new(frames), 0, is_first_line, true)?;

        Ok(LineTokens {
            tokens: acc.finish(&line),
            rule_stack: frames.into_stack(),
        })
    }

    fn tokenize(
        &mut self,
        line: &MatchLine,
        mut frames: Frames,
        mut pos: usize,
        mut is_first_line: bool,
        check_while: bool,
    ) -> Result<(TokenAccumulator, Frames)> {
        let grammar = self.grammar;
        let len = line.len();
        let mut acc = TokenAccumulator::starting_at(pos);
        let mut anchor = None;

        if check_while {
            (anchor, pos, is_first_line) =
                self.check_while_conditions(line, &mut frames, pos, is_first_line, &mut acc)?;
        }

        loop {
            let Some((matched, m)) = self.match_rule(line, &frames, pos, is_first_line, anchor)?
            else {
                acc.produce(len, &frames.top().content_scopes);
                break;
            };
            let (start, end) = (m.start(), m.end());
            let has_advanced = end > pos;

            match matched {
                Matched::End(rule) => {
                    acc.produce(start, &frames.top().content_scopes);
                    let top = frames.top_mut();
                    top.content_scopes = top.name_scopes.clone();
                    self.handle_captures(
                        line,
                        &frames,
                        is_first_line,
                        &rule.end_captures,
                        &m.captures,
                        &mut acc,
                    )?;
                    acc.produce(end, &frames.top().content_scopes);

                    let Some(popped) = frames.pop() else {
                        acc.produce(len, &frames.top().content_scopes);
                        break;
                    };
                    anchor = popped.anchor_pos;

                    // Pushed and popped without advancing: keep the rule and stop
                    if !has_advanced && popped.enter_pos == Some(pos) {
                        frames.push(popped);
                        acc.produce(len, &frames.top().content_scopes);
                        break;
                    }
                }
                Matched::Rule(id) => {
                    let rule = grammar.rule(id);
                    acc.produce(start, &frames.top().content_scopes);
                    let name = rule.name(line.as_str(), &m.captures);
                    let name_scopes = push_scopes(&frames.top().content_scopes, name);
                    frames.push(StackFrame {
                        rule: id,
                        enter_pos: Some(pos),
                        anchor_pos: anchor,
                        begin_captured_eol: end == len,
                        end_rule: None,
                        name_scopes: name_scopes.clone(),
                        content_scopes: name_scopes,
                    });

                    match rule {
                        Rule::BeginEnd(r) => {
                            self.handle_captures(
                                line,
                                &frames,
                                is_first_line,
                                &r.begin_captures,
                                &m.captures,
                                &mut acc,
                            )?;
                            acc.produce(end, &frames.top().content_scopes);
                            anchor = Some(end);

                            let top = frames.top_mut();
                            let content_name = r
                                .content_name
                                .as_ref()
                                .map(|n| n.resolve(line.as_str(), &m.captures));
                            top.content_scopes = push_scopes(&top.name_scopes, content_name);
                            if r.end_has_back_references {
                                top.end_rule = Some(resolve_back_references(
                                    r.end.source(),
                                    line.as_str(),
                                    &m.captures,
                                ));
                            }

                            if !has_advanced && frames.top_repeats_enclosing() {
                                frames.pop();
                                acc.produce(len, &frames.top().content_scopes);
                                break;
                            }
                        }
                        Rule::BeginWhile(r) => {
                            self.handle_captures(
                                line,
                                &frames,
                                is_first_line,
                                &r.begin_captures,
                                &m.captures,
                                &mut acc,
                            )?;
                            acc.produce(end, &frames.top().content_scopes);
                            anchor = Some(end);

                            let top = frames.top_mut();
                            let content_name = r
                                .content_name
                                .as_ref()
                                .map(|n| n.resolve(line.as_str(), &m.captures));
                            top.content_scopes = push_scopes(&top.name_scopes, content_name);
                            if r.while_has_back_references {
                                top.end_rule = Some(resolve_back_references(
                                    r.while_.source(),
                                    line.as_str(),
                                    &m.captures,
                                ));
                            }

                            if !has_advanced && frames.top_repeats_enclosing() {
                                frames.pop();
                                acc.produce(len, &frames.top().content_scopes);
                                break;
                            }
                        }
                        Rule::Match(r) => {
                            self.handle_captures(
                                line,
                                &frames,
                                is_first_line,
                                &r.captures,
                                &m.captures,
                                &mut acc,
                            )?;
                            acc.produce(end, &frames.top().content_scopes);
                            frames.pop();

                            // A match that consumed nothing would match again forever
                            if !has_advanced {
                                frames.pop();
                                acc.produce(len, &frames.top().content_scopes);
                                break;
                            }
                        }
                        Rule::Container { .. } => {
                            frames.pop();
                            acc.produce(len, &frames.top().content_scopes);
                            break;
                        }
                    }
                }
            }

            if has_advanced {
                pos = end;
                is_first_line = false;
            }
        }

        Ok((acc, frames))
    }

    /// Re-check the `while` condition of every begin/while rule on the
    /// stack, outermost first. The first failing rule is popped together
    /// with everything above it.
    fn check_while_conditions(
        &mut self,
        line: &MatchLine,
        frames: &mut Frames,
        mut pos: usize,
        mut is_first_line: bool,
        acc: &mut TokenAccumulator,
    ) -> Result<(Option<usize>, usize, bool)> {
        let grammar = self.grammar;
        let mut anchor = frames.top().begin_captured_eol.then_some(0);

        let while_depths: Vec<usize> = (0..frames.len())
            .filter(|&depth| matches!(grammar.rule(frames.get(depth).rule), Rule::BeginWhile(_)))
            .collect();

        for depth in while_depths {
            let frame = frames.get(depth);
            let Rule::BeginWhile(rule) = grammar.rule(frame.rule) else {
                continue;
            };
            let matcher = self.end_matcher(
                frame.end_rule.as_deref(),
                &rule.while_,
                is_first_line,
                anchor == Some(pos),
            )?;

            let Some(m) = matcher.find_next_match(line, pos) else {
                trace!("while condition failed at depth {}", depth);
                frames.truncate(depth);
                break;
            };

            let content_scopes = frame.content_scopes.clone();
            acc.produce(m.start(), &content_scopes);
            if !rule.while_captures.is_empty() {
                let mut enclosing = frames.clone();
                enclosing.truncate(depth + 1);
                self.handle_captures(
                    line,
                    &enclosing,
                    is_first_line,
                    &rule.while_captures,
                    &m.captures,
                    acc,
                )?;
            }
            acc.produce(m.end(), &content_scopes);

            anchor = Some(m.end());
            if m.end() > pos {
                pos = m.end();
                is_first_line = false;
            }
        }

        Ok((anchor, pos, is_first_line))
    }

    fn match_rule(
        &mut self,
        line: &MatchLine,
        frames: &Frames,
        pos: usize,
        is_first_line: bool,
        anchor: Option<usize>,
    ) -> Result<Option<(Matched<'g>, ScanMatch)>> {
        let grammar = self.grammar;
        let allow_g = anchor == Some(pos);
        let top = frames.top();

        let scan = grammar.scan_set(top.rule);
        let rule_match = if scan.rules.is_empty() {
            None
        } else {
            scan.patterns
                .matcher(grammar.lib(), is_first_line, allow_g)?
                .find_next_match(line, pos)
                .map(|m| (Matched::Rule(scan.rules[m.index]), m))
        };

        let (end_match, end_last) = match grammar.rule(top.rule) {
            Rule::BeginEnd(r) => {
                let matcher =
                    self.end_matcher(top.end_rule.as_deref(), &r.end, is_first_line, allow_g)?;
                (
                    matcher
                        .find_next_match(line, pos)
                        .map(|m| (Matched::End(r), m)),
                    r.apply_end_pattern_last,
                )
            }
            _ => (None, false),
        };

        Ok(match (rule_match, end_match) {
            (None, None) => None,
            (Some(r), None) => Some(r),
            (None, Some(e)) => Some(e),
            (Some(r), Some(e)) => {
                let (rs, es) = (r.1.start(), e.1.start());
                if rs < es || (rs == es && end_last) {
                    Some(r)
                } else {
                    Some(e)
                }
            }
        })
    }

    fn end_matcher(
        &mut self,
        resolved: Option<&str>,
        patterns: &'g PatternSet,
        allow_a: bool,
        allow_g: bool,
    ) -> Result<Arc<dyn Matcher>> {
        let grammar = self.grammar;
        let lib = grammar.lib();
        match resolved {
            Some(source) => self
                .dynamic
                .entry(source.to_string())
                .or_insert_with(|| PatternSet::single(source))
                .matcher(lib, allow_a, allow_g),
            None => patterns.matcher(lib, allow_a, allow_g),
        }
    }

    /// Emit tokens for the capture groups of a match.
    ///
    /// Nested groups inherit the scopes of the group enclosing them; groups
    /// whose rule has `patterns` are tokenized again in place.
    fn handle_captures(
        &mut self,
        line: &MatchLine,
        frames: &Frames,
        is_first_line: bool,
        captures: &[Option<CaptureRule>],
        indices: &CaptureIndices,
        acc: &mut TokenAccumulator,
    ) -> Result<()> {
        if captures.is_empty() {
            return Ok(());
        }

        let text = line.as_str();
        let base_scopes = &frames.top().content_scopes;
        // (scopes, end) of the groups still open
        let mut open: Vec<(Vec<String>, usize)> = Vec::with_capacity(2);

        for (capture, index) in captures.iter().zip(indices) {
            let (Some(capture), Some((start, end))) = (capture, *index) else {
                continue;
            };
            if start == end {
                continue;
            }

            while let Some((scopes, open_end)) = open.last() {
                if *open_end > start {
                    break;
                }
                acc.produce(*open_end, scopes);
                open.pop();
            }

            let base = open.last().map_or(base_scopes, |(scopes, _)| scopes);
            acc.produce(start, base);

            let name = capture.name.as_ref().map(|n| n.resolve(text, indices));

            if let Some(retokenize) = capture.retokenize {
                let name_scopes = push_scopes(base, name);
                let content_name = capture
                    .content_name
                    .as_ref()
                    .map(|n| n.resolve(text, indices));
                let content_scopes = push_scopes(&name_scopes, content_name);

                let mut nested = frames.clone();
                nested.push(StackFrame {
                    rule: retokenize,
                    enter_pos: Some(start),
                    anchor_pos: None,
                    begin_captured_eol: false,
                    end_rule: None,
                    name_scopes,
                    content_scopes,
                });

                let prefix = line.prefix(end);
                let (inner, _) =
                    self.tokenize(&prefix, nested, start, is_first_line && start == 0, false)?;
                for token in inner.tokens {
                    acc.produce(token.end, &token.scopes);
                }
                continue;
            }

            if name.is_some() {
                let scopes = push_scopes(base, name);
                open.push((scopes, end));
            }
        }

        while let Some((scopes, end)) = open.pop() {
            acc.produce(end, &scopes);
        }

        Ok(())
    }
}
