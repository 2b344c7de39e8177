//! Compiled grammar rules

use std::sync::{Arc, OnceLock};

use crate::error::Result;
use crate::names::{has_anchor, has_back_references, resolve_anchors, ScopeName};
use crate::scanner::{CaptureIndices, Matcher, ScannerLib};

/// Index of a rule inside its [`Grammar`](crate::Grammar)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub(crate) enum Rule {
    /// Only groups other rules; never pushed on the stack
    Container { patterns: Vec<RuleId> },
    Match(MatchRule),
    BeginEnd(BeginEndRule),
    BeginWhile(BeginWhileRule),
}

impl Rule {
    /// Child rules scanned while this rule is on top of the stack
    pub(crate) fn patterns(&self) -> &[RuleId] {
        match self {
            Rule::Container { patterns } => patterns,
            Rule::Match(_) => &[],
            Rule::BeginEnd(r) => &r.patterns,
            Rule::BeginWhile(r) => &r.patterns,
        }
    }

    /// Pattern that starts this rule, if it can be matched at all
    pub(crate) fn start_pattern(&self) -> Option<&str> {
        match self {
            Rule::Container { .. } => None,
            Rule::Match(r) => Some(&r.pattern),
            Rule::BeginEnd(r) => Some(&r.begin),
            Rule::BeginWhile(r) => Some(&r.begin),
        }
    }

    pub(crate) fn name(&self, line: &str, captures: &CaptureIndices) -> Option<String> {
        let name = match self {
            Rule::Container { .. } => None,
            Rule::Match(r) => r.name.as_ref(),
            Rule::BeginEnd(r) => r.name.as_ref(),
            Rule::BeginWhile(r) => r.name.as_ref(),
        };
        name.map(|n| n.resolve(line, captures))
    }
}

#[derive(Debug)]
pub(crate) struct MatchRule {
    pub(crate) name: Option<ScopeName>,
    pub(crate) pattern: String,
    pub(crate) captures: Vec<Option<CaptureRule>>,
}

#[derive(Debug)]
pub(crate) struct BeginEndRule {
    pub(crate) name: Option<ScopeName>,
    pub(crate) content_name: Option<ScopeName>,
    pub(crate) begin: String,
    pub(crate) begin_captures: Vec<Option<CaptureRule>>,
    pub(crate) end: PatternSet,
    pub(crate) end_has_back_references: bool,
    pub(crate) end_captures: Vec<Option<CaptureRule>>,
    pub(crate) apply_end_pattern_last: bool,
    pub(crate) patterns: Vec<RuleId>,
}

#[derive(Debug)]
pub(crate) struct BeginWhileRule {
    pub(crate) name: Option<ScopeName>,
    pub(crate) content_name: Option<ScopeName>,
    pub(crate) begin: String,
    pub(crate) begin_captures: Vec<Option<CaptureRule>>,
    pub(crate) while_: PatternSet,
    pub(crate) while_has_back_references: bool,
    pub(crate) while_captures: Vec<Option<CaptureRule>>,
    pub(crate) patterns: Vec<RuleId>,
}

/// Scope assignment for one capture group
#[derive(Debug, Clone)]
pub(crate) struct CaptureRule {
    pub(crate) name: Option<ScopeName>,
    pub(crate) content_name: Option<ScopeName>,
    /// Container rule used to tokenize the captured text again
    pub(crate) retokenize: Option<RuleId>,
}

/// Rules that may start at the current position, with their patterns
pub(crate) struct ScanSet {
    pub(crate) rules: Vec<RuleId>,
    pub(crate) patterns: PatternSet,
}

/// Pattern list compiled on first use.
///
/// Patterns using `\A` or `\G` are compiled once per anchor combination,
/// everything else exactly once.
pub(crate) struct PatternSet {
    sources: Vec<String>,
    has_anchor: bool,
    compiled: [OnceLock<Result<Arc<dyn Matcher>>>; 4],
}

impl std::fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternSet")
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl PatternSet {
    pub(crate) fn new(sources: Vec<String>) -> Self {
        let has_anchor = sources.iter().any(|s| has_anchor(s));
        Self {
            sources,
            has_anchor,
            compiled: Default::default(),
        }
    }

    pub(crate) fn single(source: &str) -> Self {
        Self::new(vec![source.to_string()])
    }

    pub(crate) fn source(&self) -> &str {
        self.sources.first().map_or("", String::as_str)
    }

    pub(crate) fn has_back_references(&self) -> bool {
        self.sources.iter().any(|s| has_back_references(s))
    }

    pub(crate) fn matcher(
        &self,
        lib: &dyn ScannerLib,
        allow_a: bool,
        allow_g: bool,
    ) -> Result<Arc<dyn Matcher>> {
        let slot = if self.has_anchor {
            (usize::from(allow_a) << 1) | usize::from(allow_g)
        } else {
            0
        };

        self.compiled[slot]
            .get_or_init(|| {
                let sources: Vec<String> = if self.has_anchor {
                    self.sources
                        .iter()
                        .map(|s| resolve_anchors(s, allow_a, allow_g))
                        .collect()
                } else {
                    self.sources.clone()
                };
                lib.compile_patterns(&sources).map(Arc::from)
            })
            .clone()
    }
}
