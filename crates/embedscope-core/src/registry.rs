//! Grammar registry
//!
//! Resolves scope names to compiled grammars. Raw grammars and compiled
//! grammars are cached per scope for the lifetime of the registry, and
//! concurrent requests for one scope share a single load.

use std::collections::BTreeSet;
use std::sync::Arc;

use embedscope_grammar::{Grammar, RawGrammar, RawGrammarSet};
use tracing::{debug, error, info, warn};

use crate::backend::ScannerBackend;
use crate::cache::InFlight;
use crate::error::{Result, ScopeError};
use crate::source::{BundledGrammarSource, GrammarSource, GrammarTable};

/// Loads and caches grammars by scope name
#[derive(Debug)]
pub struct GrammarRegistry {
    table: GrammarTable,
    source: Arc<dyn GrammarSource>,
    backend: Arc<ScannerBackend>,
    raw: InFlight<String, Arc<RawGrammar>>,
    compiled: InFlight<String, Arc<Grammar>>,
}

impl GrammarRegistry {
    pub fn new(
        table: GrammarTable,
        source: Arc<dyn GrammarSource>,
        backend: Arc<ScannerBackend>,
    ) -> Self {
        Self {
            table,
            source,
            backend,
            raw: InFlight::new(),
            compiled: InFlight::new(),
        }
    }

    /// Registry over the bundled grammars and the shared Oniguruma backend
    pub fn bundled() -> Self {
        Self::new(
            GrammarTable::default(),
            Arc::new(BundledGrammarSource),
            ScannerBackend::shared(),
        )
    }

    pub fn table(&self) -> &GrammarTable {
        &self.table
    }

    pub fn backend(&self) -> &Arc<ScannerBackend> {
        &self.backend
    }

    /// Compiled grammar for `scope_name`, if one was already loaded
    pub fn cached(&self, scope_name: &str) -> Option<Arc<Grammar>> {
        self.compiled.get(&scope_name.to_string())
    }

    /// Load the grammar for `scope_name`.
    ///
    /// Failures are logged and reported as `None`; see
    /// [`GrammarRegistry::try_load_grammar`] for the error.
    pub async fn load_grammar(&self, scope_name: &str) -> Option<Arc<Grammar>> {
        match self.try_load_grammar(scope_name).await {
            Ok(grammar) => Some(grammar),
            Err(ScopeError::UnmappedScope(scope)) => {
                warn!("No grammar path found for scope {}", scope);
                None
            }
            Err(e) => {
                error!("Failed to load grammar {}: {}", scope_name, e);
                None
            }
        }
    }

    /// Load the grammar for `scope_name`, compiling it on first request.
    ///
    /// An unmapped scope fails before any I/O. Failed loads are not cached.
    pub async fn try_load_grammar(&self, scope_name: &str) -> Result<Arc<Grammar>> {
        if self.table.location(scope_name).is_none() {
            return Err(ScopeError::UnmappedScope(scope_name.to_string()));
        }

        self.compiled
            .get_or_load(scope_name.to_string(), || self.compile(scope_name))
            .await
    }

    async fn compile(&self, scope_name: &str) -> Result<Arc<Grammar>> {
        let lib = self.backend.get().await?;
        let grammars = self.collect_raw(scope_name).await?;

        let grammar = Grammar::compile(scope_name, &grammars, lib)?;
        info!(
            "Compiled grammar {} ({} rules, {} grammars)",
            scope_name,
            grammar.rule_count(),
            grammars.len()
        );
        Ok(Arc::new(grammar))
    }

    /// Raw grammar for `scope_name` plus every grammar it embeds.
    ///
    /// Embedded grammars that cannot be loaded are left out; their includes
    /// compile to nothing. The host grammar compiled without them stays
    /// cached, while the failed embedded load itself is forgotten and is
    /// retried when that scope is requested as a root.
    async fn collect_raw(&self, scope_name: &str) -> Result<RawGrammarSet> {
        let mut grammars = RawGrammarSet::new();
        let mut missing = BTreeSet::new();
        let mut pending = vec![scope_name.to_string()];

        while let Some(scope) = pending.pop() {
            if grammars.contains_key(&scope) || missing.contains(&scope) {
                continue;
            }

            let raw = match self.load_raw(&scope).await {
                Ok(raw) => raw,
                Err(e) if scope == scope_name => return Err(e),
                Err(e) => {
                    warn!("Embedded grammar {} unavailable: {}", scope, e);
                    missing.insert(scope);
                    continue;
                }
            };

            pending.extend(
                raw.external_scopes()
                    .into_iter()
                    .filter(|s| !grammars.contains_key(s)),
            );
            grammars.insert(scope, raw);
        }

        Ok(grammars)
    }

    async fn load_raw(&self, scope_name: &str) -> Result<Arc<RawGrammar>> {
        let location = self
            .table
            .location(scope_name)
            .ok_or_else(|| ScopeError::UnmappedScope(scope_name.to_string()))?;

        self.raw
            .get_or_load(scope_name.to_string(), || async move {
                debug!("Loading grammar {} from {}", scope_name, location);
                let text = self.source.read(location).await?;
                let raw = RawGrammar::from_json(location, &text)?;
                if raw.scope_name != scope_name {
                    warn!(
                        "Grammar at {} declares scope {}, expected {}",
                        location, raw.scope_name, scope_name
                    );
                }
                Ok(Arc::new(raw))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unmapped_scope_is_none() {
        let registry = GrammarRegistry::bundled();
        assert!(registry.load_grammar("source.python").await.is_none());
        assert_eq!(
            registry.try_load_grammar("source.python").await.unwrap_err(),
            ScopeError::UnmappedScope("source.python".to_string())
        );
    }

    #[tokio::test]
    async fn test_loaded_grammar_is_cached() {
        let registry = GrammarRegistry::bundled();
        assert!(registry.cached("source.css").is_none());

        let first = registry.load_grammar("source.css").await.unwrap();
        let second = registry.load_grammar("source.css").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.scope_name(), "source.css");
        assert!(registry.cached("source.css").is_some());
    }

    #[tokio::test]
    async fn test_embedded_grammars_share_raw_cache() {
        let registry = GrammarRegistry::bundled();
        registry.load_grammar("text.html.basic").await.unwrap();

        assert!(registry.raw.get(&"source.js".to_string()).is_some());
        assert!(registry.raw.get(&"source.css".to_string()).is_some());
        assert!(registry.cached("source.js").is_none());
    }

    #[tokio::test]
    async fn test_missing_embedded_grammar_is_skipped() {
        let table = GrammarTable::from_entries([(
            "text.html.basic",
            "syntaxes/html.tmLanguage.json",
        )]);
        let registry = GrammarRegistry::new(
            table,
            Arc::new(BundledGrammarSource),
            ScannerBackend::shared(),
        );

        let grammar = registry.load_grammar("text.html.basic").await;
        assert!(grammar.is_some());
    }
}
