//! Raw grammar -> rule arena
//!
//! Every raw rule is compiled once: the arena id is recorded against the raw
//! rule's address before its children are compiled, so recursive grammars
//! (`#expression` including itself through a begin/end rule) terminate.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{GrammarError, Result};
use crate::names::ScopeName;
use crate::raw::{RawCaptures, RawGrammar, RawRule, Repository};
use crate::rule::{
    BeginEndRule, BeginWhileRule, CaptureRule, MatchRule, PatternSet, Rule, RuleId,
};
use crate::RawGrammarSet;

/// `end` used by begin rules that omit one: never matches
const NEVER_END: &str = "\u{FFFF}";

pub(crate) struct Compiled {
    pub(crate) rules: Vec<Rule>,
    pub(crate) root: RuleId,
}

pub(crate) fn compile(scope_name: &str, grammars: &RawGrammarSet) -> Result<Compiled> {
    let base = grammars
        .get(scope_name)
        .ok_or_else(|| GrammarError::MissingGrammar(scope_name.to_string()))?;

    let mut compiler = Compiler {
        base,
        grammars,
        rules: Vec::new(),
        by_address: HashMap::new(),
        roots: HashMap::new(),
    };
    let root = compiler.compile_root(base);
    debug!("Compiled {} into {} rules", scope_name, compiler.rules.len());

    Ok(Compiled {
        rules: compiler.rules,
        root,
    })
}

struct Compiler<'a> {
    base: &'a RawGrammar,
    grammars: &'a RawGrammarSet,
    rules: Vec<Rule>,
    by_address: HashMap<*const RawRule, RuleId>,
    roots: HashMap<&'a str, RuleId>,
}

impl<'a> Compiler<'a> {
    fn reserve(&mut self) -> RuleId {
        let id = RuleId::new(self.rules.len());
        self.rules.push(Rule::Container {
            patterns: Vec::new(),
        });
        id
    }

    /// The `$self` rule of `grammar`
    fn compile_root(&mut self, grammar: &'a RawGrammar) -> RuleId {
        if let Some(&id) = self.roots.get(grammar.scope_name.as_str()) {
            return id;
        }
        let id = self.reserve();
        self.roots.insert(grammar.scope_name.as_str(), id);

        let repo = [&grammar.repository];
        let patterns = self.compile_patterns(&grammar.patterns, grammar, &repo);
        self.rules[id.index()] = Rule::Container { patterns };
        id
    }

    fn compile_patterns(
        &mut self,
        patterns: &'a [RawRule],
        grammar: &'a RawGrammar,
        repo: &[&'a Repository],
    ) -> Vec<RuleId> {
        let mut ids = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let id = match &pattern.include {
                Some(include) => self.resolve_include(include, grammar, repo),
                None => Some(self.compile_rule(pattern, grammar, repo)),
            };
            ids.extend(id);
        }
        ids
    }

    fn resolve_include(
        &mut self,
        include: &str,
        grammar: &'a RawGrammar,
        repo: &[&'a Repository],
    ) -> Option<RuleId> {
        if let Some(key) = include.strip_prefix('#') {
            let Some(rule) = repo.iter().rev().copied().find_map(|r| r.get(key)) else {
                debug!("Unresolved include {} in {}", include, grammar.scope_name);
                return None;
            };
            return Some(self.compile_rule(rule, grammar, repo));
        }

        match include {
            "$self" => return Some(self.compile_root(grammar)),
            "$base" => return Some(self.compile_root(self.base)),
            _ => {}
        }

        let (scope, key) = match include.split_once('#') {
            Some((scope, key)) => (scope, Some(key)),
            None => (include, None),
        };
        let grammars: &'a RawGrammarSet = self.grammars;
        let Some(external) = grammars.get(scope) else {
            debug!("Grammar {} not available for include", scope);
            return None;
        };
        let external: &'a RawGrammar = external.as_ref();
        match key {
            None => Some(self.compile_root(external)),
            Some(key) => {
                let rule = external.repository.get(key)?;
                Some(self.compile_rule(rule, external, &[&external.repository]))
            }
        }
    }

    fn compile_rule(
        &mut self,
        raw: &'a RawRule,
        grammar: &'a RawGrammar,
        repo: &[&'a Repository],
    ) -> RuleId {
        let address = raw as *const RawRule;
        if let Some(&id) = self.by_address.get(&address) {
            return id;
        }
        let id = self.reserve();
        self.by_address.insert(address, id);

        let mut chain = repo.to_vec();
        if let Some(own) = &raw.repository {
            chain.push(own);
        }
        let chain = chain.as_slice();

        let rule = if let Some(pattern) = &raw.match_ {
            Rule::Match(MatchRule {
                name: raw.name.as_deref().map(ScopeName::new),
                pattern: pattern.clone(),
                captures: self.compile_captures(raw.captures.as_ref(), grammar, chain),
            })
        } else if let Some(begin) = &raw.begin {
            let patterns = match &raw.patterns {
                Some(patterns) => self.compile_patterns(patterns, grammar, chain),
                None => Vec::new(),
            };
            let begin_captures = self.compile_captures(
                raw.begin_captures.as_ref().or(raw.captures.as_ref()),
                grammar,
                chain,
            );

            if let Some(while_) = &raw.while_ {
                let while_ = PatternSet::single(while_);
                Rule::BeginWhile(BeginWhileRule {
                    name: raw.name.as_deref().map(ScopeName::new),
                    content_name: raw.content_name.as_deref().map(ScopeName::new),
                    begin: begin.clone(),
                    begin_captures,
                    while_has_back_references: while_.has_back_references(),
                    while_,
                    while_captures: self.compile_captures(
                        raw.while_captures.as_ref().or(raw.captures.as_ref()),
                        grammar,
                        chain,
                    ),
                    patterns,
                })
            } else {
                let end = PatternSet::single(raw.end.as_deref().unwrap_or(NEVER_END));
                Rule::BeginEnd(BeginEndRule {
                    name: raw.name.as_deref().map(ScopeName::new),
                    content_name: raw.content_name.as_deref().map(ScopeName::new),
                    begin: begin.clone(),
                    begin_captures,
                    end_has_back_references: end.has_back_references(),
                    end,
                    end_captures: self.compile_captures(
                        raw.end_captures.as_ref().or(raw.captures.as_ref()),
                        grammar,
                        chain,
                    ),
                    apply_end_pattern_last: raw
                        .apply_end_pattern_last
                        .map_or(false, |f| f.is_set()),
                    patterns,
                })
            }
        } else {
            let patterns = match (&raw.patterns, &raw.include) {
                (Some(patterns), _) => self.compile_patterns(patterns, grammar, chain),
                (None, Some(include)) => self
                    .resolve_include(include, grammar, chain)
                    .into_iter()
                    .collect(),
                (None, None) => Vec::new(),
            };
            Rule::Container { patterns }
        };

        self.rules[id.index()] = rule;
        id
    }

    fn compile_captures(
        &mut self,
        captures: Option<&'a RawCaptures>,
        grammar: &'a RawGrammar,
        repo: &[&'a Repository],
    ) -> Vec<Option<CaptureRule>> {
        let Some(captures) = captures else {
            return Vec::new();
        };
        let Some(len) = captures
            .keys()
            .filter_map(|k| k.parse::<usize>().ok())
            .max()
            .map(|max| max + 1)
        else {
            return Vec::new();
        };

        let mut out = vec![None; len];
        for (key, raw) in captures {
            let Ok(group) = key.parse::<usize>() else {
                continue;
            };
            let retokenize = raw
                .patterns
                .as_ref()
                .map(|_| self.compile_rule(raw, grammar, repo));
            out[group] = Some(CaptureRule {
                name: raw.name.as_deref().map(ScopeName::new),
                content_name: raw.content_name.as_deref().map(ScopeName::new),
                retokenize,
            });
        }
        out
    }
}
