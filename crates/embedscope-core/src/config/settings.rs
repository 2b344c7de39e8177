//! Configuration settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_MAX_LINE_LENGTH;
use crate::source::{
    BundledGrammarSource, FsGrammarSource, GrammarSource, GrammarTable, HTML_SCOPE,
};

/// File name looked up when no configuration path is given
pub const DEFAULT_CONFIG_FILE: &str = "embedscope.toml";

/// Top-level settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scope used when the caller does not name one
    pub root_scope: String,
    /// Resource limits
    pub limits: LimitSettings,
    /// Where grammars come from
    pub grammars: GrammarSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_scope: HTML_SCOPE.to_string(),
            limits: LimitSettings::default(),
            grammars: GrammarSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize settings back to TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Resource limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Lines longer than this (UTF-16 code units) are not tokenized
    pub max_line_length: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Grammar locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GrammarSettings {
    /// Directory grammar locations are relative to; bundled grammars if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Scope name to grammar location; empty keeps the defaults
    pub scopes: BTreeMap<String, String>,
}

impl GrammarSettings {
    /// Scope table described by these settings
    pub fn table(&self) -> GrammarTable {
        if self.scopes.is_empty() {
            GrammarTable::default()
        } else {
            GrammarTable::from_entries(self.scopes.clone())
        }
    }

    /// Grammar source described by these settings
    pub fn source(&self) -> Arc<dyn GrammarSource> {
        match &self.dir {
            Some(dir) => Arc::new(FsGrammarSource::new(dir)),
            None => Arc::new(BundledGrammarSource),
        }
    }

    /// Resolve a relative `dir` against `base`
    pub fn rebase(&mut self, base: &Path) {
        if let Some(dir) = &self.dir {
            if dir.is_relative() {
                self.dir = Some(base.join(dir));
            }
        }
    }
}
