//! Grammar sources and the scope table
//!
//! A [`GrammarTable`] maps a root scope name to the location of its grammar;
//! a [`GrammarSource`] turns a location into grammar text.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, ScopeError};

/// Root scope of the HTML grammar
pub const HTML_SCOPE: &str = "text.html.basic";
/// Root scope of the JavaScript grammar
pub const JAVASCRIPT_SCOPE: &str = "source.js";
/// Root scope of the CSS grammar
pub const CSS_SCOPE: &str = "source.css";

const HTML_LOCATION: &str = "syntaxes/html.tmLanguage.json";
const JAVASCRIPT_LOCATION: &str = "syntaxes/javascript.tmLanguage.json";
const CSS_LOCATION: &str = "syntaxes/css.tmLanguage.json";

/// Scope to location pairs used when nothing else is configured
pub const DEFAULT_GRAMMARS: [(&str, &str); 3] = [
    (HTML_SCOPE, HTML_LOCATION),
    (JAVASCRIPT_SCOPE, JAVASCRIPT_LOCATION),
    (CSS_SCOPE, CSS_LOCATION),
];

/// Reads grammar text by location
#[async_trait]
pub trait GrammarSource: Send + Sync + fmt::Debug {
    async fn read(&self, location: &str) -> Result<String>;
}

/// Grammars read from disk, locations relative to `root`
#[derive(Debug, Clone)]
pub struct FsGrammarSource {
    root: PathBuf,
}

impl FsGrammarSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl GrammarSource for FsGrammarSource {
    async fn read(&self, location: &str) -> Result<String> {
        let path = self.root.join(location);
        debug!("Reading grammar file {}", path.display());
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ScopeError::Read {
                location: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// The HTML, JavaScript and CSS grammars compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledGrammarSource;

impl BundledGrammarSource {
    fn lookup(location: &str) -> Option<&'static str> {
        match location {
            HTML_LOCATION => Some(include_str!("../syntaxes/html.tmLanguage.json")),
            JAVASCRIPT_LOCATION => Some(include_str!("../syntaxes/javascript.tmLanguage.json")),
            CSS_LOCATION => Some(include_str!("../syntaxes/css.tmLanguage.json")),
            _ => None,
        }
    }
}

#[async_trait]
impl GrammarSource for BundledGrammarSource {
    async fn read(&self, location: &str) -> Result<String> {
        Self::lookup(location)
            .map(str::to_string)
            .ok_or_else(|| ScopeError::Read {
                location: location.to_string(),
                reason: "no bundled grammar at this location".to_string(),
            })
    }
}

/// Root scope name to grammar location, fixed once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarTable {
    entries: BTreeMap<String, String>,
}

impl Default for GrammarTable {
    fn default() -> Self {
        Self::from_entries(DEFAULT_GRAMMARS)
    }
}

impl GrammarTable {
    pub fn from_entries<I, S, L>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, L)>,
        S: Into<String>,
        L: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(scope, location)| (scope.into(), location.into()))
                .collect(),
        }
    }

    /// Location of the grammar for `scope_name`
    pub fn location(&self, scope_name: &str) -> Option<&str> {
        self.entries.get(scope_name).map(String::as_str)
    }

    /// Mapped scope names, in order
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
