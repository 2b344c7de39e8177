//! Shared helpers for embedscope-core integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use embedscope_core::{
    BundledGrammarSource, GrammarRegistry, GrammarSource, GrammarTable, Result, ScannerBackend,
    ScopeResolver,
};

/// Bundled grammars, counting every read
#[derive(Debug, Default)]
pub struct CountingSource {
    inner: BundledGrammarSource,
    reads: AtomicUsize,
    locations: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose reads take `delay` to complete
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn locations(&self) -> Vec<String> {
        self.locations.lock().unwrap().clone()
    }
}

#[async_trait]
impl GrammarSource for CountingSource {
    async fn read(&self, location: &str) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.locations.lock().unwrap().push(location.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.read(location).await
    }
}

/// Registry over the default table reading through `source`
pub fn registry(source: Arc<CountingSource>) -> Arc<GrammarRegistry> {
    Arc::new(GrammarRegistry::new(
        GrammarTable::default(),
        source,
        ScannerBackend::shared(),
    ))
}

pub fn resolver(source: Arc<CountingSource>) -> ScopeResolver {
    ScopeResolver::new(registry(source))
}

/// Owned scope list from string literals
pub fn scopes(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
