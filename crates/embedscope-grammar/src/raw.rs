//! Raw TextMate grammar model
//!
//! Mirrors the JSON layout of `*.tmLanguage.json` files. Only the keys the
//! tokenizer interprets are modelled; anything else (`injections`,
//! `firstLineMatch`, `uuid`, ...) is ignored on load.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, Result};

/// Named rules of a grammar or of a rule with a nested `repository`
pub type Repository = BTreeMap<String, RawRule>;

/// Capture rules keyed by group number (`"0"`, `"1"`, ...)
pub type RawCaptures = BTreeMap<String, RawRule>;

/// A parsed, uncompiled grammar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrammar {
    /// Root scope, e.g. `text.html.basic`
    pub scope_name: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File extensions the grammar is registered for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
    /// Top-level patterns
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    /// Named rules reachable through `#key` includes
    #[serde(default)]
    pub repository: Repository,
}

impl RawGrammar {
    /// Parse a grammar from its JSON text.
    ///
    /// `origin` names the source (usually the file name) in error messages.
    pub fn from_json(origin: &str, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| GrammarError::InvalidGrammar {
            name: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Scope names of other grammars this grammar includes.
    ///
    /// `source.js#expression` contributes `source.js`; `$self`, `$base` and
    /// local `#key` references are skipped.
    pub fn external_scopes(&self) -> BTreeSet<String> {
        let mut scopes = BTreeSet::new();
        for rule in self.patterns.iter().chain(self.repository.values()) {
            rule.collect_external_scopes(&mut scopes);
        }
        scopes.remove(&self.scope_name);
        scopes
    }
}

/// One rule description inside a grammar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captures: Option<RawCaptures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_captures: Option<RawCaptures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_captures: Option<RawCaptures>,
    #[serde(default, rename = "while", skip_serializing_if = "Option::is_none")]
    pub while_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub while_captures: Option<RawCaptures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<RawRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_end_pattern_last: Option<Flag>,
}

impl RawRule {
    fn collect_external_scopes(&self, scopes: &mut BTreeSet<String>) {
        if let Some(include) = &self.include {
            if !include.starts_with('#') && !include.starts_with('$') {
                let scope = include.split('#').next().unwrap_or(include);
                scopes.insert(scope.to_string());
            }
        }

        let nested = self
            .patterns
            .iter()
            .flatten()
            .chain(self.repository.iter().flat_map(|r| r.values()))
            .chain(
                [
                    &self.captures,
                    &self.begin_captures,
                    &self.end_captures,
                    &self.while_captures,
                ]
                .into_iter()
                .flatten()
                .flat_map(|c| c.values()),
            );
        for rule in nested {
            rule.collect_external_scopes(scopes);
        }
    }
}

/// Boolean flag that grammars write either as `true` or as `1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    /// Whether the flag is switched on
    pub fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_grammar() {
        let grammar = RawGrammar::from_json(
            "mini.json",
            r#"{ "scopeName": "source.mini", "patterns": [{ "match": "a", "name": "x" }] }"#,
        )
        .unwrap();

        assert_eq!(grammar.scope_name, "source.mini");
        assert_eq!(grammar.patterns.len(), 1);
        assert_eq!(grammar.patterns[0].match_.as_deref(), Some("a"));
        assert!(grammar.repository.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let grammar = RawGrammar::from_json(
            "mini.json",
            r#"{ "scopeName": "source.mini", "uuid": "x", "injections": {}, "patterns": [] }"#,
        )
        .unwrap();
        assert_eq!(grammar.scope_name, "source.mini");
    }

    #[test]
    fn test_invalid_json_reports_origin() {
        let err = RawGrammar::from_json("broken.json", "{ not json").unwrap_err();
        match err {
            GrammarError::InvalidGrammar { name, .. } => assert_eq!(name, "broken.json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_apply_end_pattern_last_accepts_int_and_bool() {
        let grammar = RawGrammar::from_json(
            "mini.json",
            r#"{ "scopeName": "source.mini", "patterns": [
                { "begin": "a", "end": "b", "applyEndPatternLast": 1 },
                { "begin": "c", "end": "d", "applyEndPatternLast": false }
            ] }"#,
        )
        .unwrap();

        assert_eq!(
            grammar.patterns[0].apply_end_pattern_last.map(Flag::is_set),
            Some(true)
        );
        assert_eq!(
            grammar.patterns[1].apply_end_pattern_last.map(Flag::is_set),
            Some(false)
        );
    }

    #[test]
    fn test_external_scopes() {
        let grammar = RawGrammar::from_json(
            "html.json",
            r##"{
                "scopeName": "text.html.basic",
                "patterns": [{ "include": "#tags" }, { "include": "$self" }],
                "repository": {
                    "tags": {
                        "begin": "<script>",
                        "end": "</script>",
                        "patterns": [{ "include": "source.js" }]
                    },
                    "styles": {
                        "match": "x",
                        "captures": { "1": { "patterns": [{ "include": "source.css#rule-list" }] } }
                    }
                }
            }"##,
        )
        .unwrap();

        let scopes: Vec<_> = grammar.external_scopes().into_iter().collect();
        assert_eq!(scopes, vec!["source.css".to_string(), "source.js".to_string()]);
    }
}
