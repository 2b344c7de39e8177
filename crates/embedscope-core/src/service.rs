//! Configured entry point
//!
//! [`ScopeService`] wires settings into a registry and resolver and answers
//! the questions a comment toggle asks: which scopes apply here, and which
//! comment style do they call for.

use std::sync::Arc;

use embedscope_grammar::Token;
use tracing::debug;

use crate::backend::ScannerBackend;
use crate::comment::CommentStyle;
use crate::config::Settings;
use crate::document::{DocumentView, Position};
use crate::error::Result;
use crate::registry::GrammarRegistry;
use crate::resolver::ScopeResolver;

#[derive(Debug, Clone)]
pub struct ScopeService {
    resolver: ScopeResolver,
    root_scope: String,
}

impl Default for ScopeService {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ScopeService {
    pub fn new(resolver: ScopeResolver, root_scope: impl Into<String>) -> Self {
        Self {
            resolver,
            root_scope: root_scope.into(),
        }
    }

    /// Service over the grammars and limits in `settings`, sharing the
    /// process-wide scanner backend
    pub fn from_settings(settings: &Settings) -> Self {
        Self::from_settings_with_backend(settings, ScannerBackend::shared())
    }

    pub fn from_settings_with_backend(
        settings: &Settings,
        backend: Arc<ScannerBackend>,
    ) -> Self {
        let registry = GrammarRegistry::new(
            settings.grammars.table(),
            settings.grammars.source(),
            backend,
        );
        debug!(
            "Scope service for {} over {} grammars",
            settings.root_scope,
            registry.table().len()
        );
        let resolver = ScopeResolver::new(Arc::new(registry))
            .with_max_line_length(settings.limits.max_line_length);
        Self::new(resolver, settings.root_scope.clone())
    }

    /// Default root scope
    pub fn root_scope(&self) -> &str {
        &self.root_scope
    }

    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    /// Scope stack at `position`, under `root_scope` or the default root
    pub async fn scopes_at<D>(
        &self,
        document: &D,
        position: Position,
        root_scope: Option<&str>,
    ) -> Option<Vec<String>>
    where
        D: DocumentView + ?Sized,
    {
        let root_scope = root_scope.unwrap_or(&self.root_scope);
        self.resolver
            .resolve_scopes_at(document, position, root_scope)
            .await
    }

    /// Comment style at `position`; markup when no scopes are available
    pub async fn comment_style_at<D>(
        &self,
        document: &D,
        position: Position,
        root_scope: Option<&str>,
    ) -> CommentStyle
    where
        D: DocumentView + ?Sized,
    {
        let scopes = self.scopes_at(document, position, root_scope).await;
        CommentStyle::for_scopes(scopes.as_deref())
    }

    /// Tokens of every line, under `root_scope` or the default root
    pub async fn tokenize<D>(
        &self,
        document: &D,
        root_scope: Option<&str>,
    ) -> Result<Vec<Vec<Token>>>
    where
        D: DocumentView + ?Sized,
    {
        let root_scope = root_scope.unwrap_or(&self.root_scope);
        self.resolver.tokenize_document(document, root_scope).await
    }
}
