//! Compiled grammar

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::compile::{compile, Compiled};
use crate::error::Result;
use crate::rule::{PatternSet, Rule, RuleId, ScanSet};
use crate::scanner::ScannerLib;
use crate::stack::RuleStack;
use crate::tokenizer::{LineTokenizer, LineTokens};
use crate::RawGrammarSet;

/// An immutable, compiled grammar for one root scope.
///
/// Patterns are handed to the scanner lazily, the first time a rule is
/// scanned, and shared afterwards: a `Grammar` is meant to be built once and
/// kept behind an `Arc` for the lifetime of the process.
pub struct Grammar {
    scope_name: String,
    root: RuleId,
    rules: Vec<Rule>,
    /// Flattened candidate rules per rule id, built on first use
    scan_sets: Vec<OnceLock<ScanSet>>,
    lib: Arc<dyn ScannerLib>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("scope_name", &self.scope_name)
            .field("rules", &self.rules.len())
            .field("lib", &self.lib)
            .finish()
    }
}

impl Grammar {
    /// Compile the grammar for `scope_name`.
    ///
    /// `grammars` must contain the raw grammar for `scope_name`; other
    /// grammars it includes are resolved from the same set and silently
    /// skipped when absent.
    pub fn compile(
        scope_name: &str,
        grammars: &RawGrammarSet,
        lib: Arc<dyn ScannerLib>,
    ) -> Result<Self> {
        let Compiled { rules, root } = compile(scope_name, grammars)?;
        let scan_sets = rules.iter().map(|_| OnceLock::new()).collect();

        Ok(Self {
            scope_name: scope_name.to_string(),
            root,
            rules,
            scan_sets,
            lib,
        })
    }

    /// Root scope of the grammar, e.g. `text.html.basic`
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Number of compiled rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Tokenize one line of text.
    ///
    /// `prev` is the [`RuleStack`] returned for the previous line, or
    /// [`RuleStack::initial`] for the first line of a document. `text` must
    /// not contain a line terminator.
    pub fn tokenize_line(&self, text: &str, prev: &RuleStack) -> Result<LineTokens> {
        LineTokenizer::new(self).tokenize_line(text, prev)
    }

    pub(crate) fn root(&self) -> RuleId {
        self.root
    }

    pub(crate) fn lib(&self) -> &dyn ScannerLib {
        self.lib.as_ref()
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// Rules that can start while `id` is on top of the stack
    pub(crate) fn scan_set(&self, id: RuleId) -> &ScanSet {
        self.scan_sets[id.index()].get_or_init(|| {
            let mut rules = Vec::new();
            let mut visited = HashSet::new();
            self.collect_candidates(self.rule(id).patterns(), &mut visited, &mut rules);

            let sources = rules
                .iter()
                .filter_map(|&r| self.rule(r).start_pattern().map(str::to_string))
                .collect();
            ScanSet {
                rules,
                patterns: PatternSet::new(sources),
            }
        })
    }

    fn collect_candidates(
        &self,
        patterns: &[RuleId],
        visited: &mut HashSet<RuleId>,
        out: &mut Vec<RuleId>,
    ) {
        for &id in patterns {
            match self.rule(id) {
                Rule::Container { patterns } => {
                    if visited.insert(id) {
                        self.collect_candidates(patterns, visited, out);
                    }
                }
                _ => out.push(id),
            }
        }
    }
}
