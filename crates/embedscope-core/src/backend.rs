//! Scanner backend initialization
//!
//! The Oniguruma backend is brought up once per process. Every grammar
//! shares the same [`ScannerBackend`]; callers that ask for it while the
//! initialization is running wait for that attempt instead of starting a new
//! one. A failed attempt is reported to everyone waiting on it and then
//! forgotten, so the next request tries again.

use std::fmt;
use std::sync::{Arc, OnceLock};

use embedscope_grammar::{OnigLib, ScannerLib};
use tracing::{debug, info, warn};

use crate::cache::InFlight;
use crate::error::{Result, ScopeError};
use crate::BoxFuture;

/// Pattern exercising the Oniguruma-only constructs grammars rely on
const PROBE_PATTERN: &str = r"\G(?<=a)\h+";

type Loader = dyn Fn() -> BoxFuture<'static, Result<Arc<dyn ScannerLib>>> + Send + Sync;

/// Memoized handle to the pattern-matching backend
pub struct ScannerBackend {
    memo: InFlight<(), Arc<dyn ScannerLib>>,
    loader: Box<Loader>,
}

impl fmt::Debug for ScannerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerBackend")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Default for ScannerBackend {
    fn default() -> Self {
        Self::onig()
    }
}

impl ScannerBackend {
    /// Backend that initializes Oniguruma on first use
    pub fn onig() -> Self {
        Self::with_loader(|| Box::pin(init_onig()))
    }

    /// Backend with a custom initialization routine.
    ///
    /// `loader` runs at most once at a time; it is called again only after
    /// an attempt failed.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn ScannerLib>>> + Send + Sync + 'static,
    {
        Self {
            memo: InFlight::new(),
            loader: Box::new(loader),
        }
    }

    /// The process-wide Oniguruma backend
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<ScannerBackend>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::onig())))
    }

    /// Return the initialized backend, initializing it if needed
    pub async fn get(&self) -> Result<Arc<dyn ScannerLib>> {
        let result = self.memo.get_or_load((), || (self.loader)()).await;
        if let Err(e) = &result {
            warn!("Scanner backend initialization failed: {}", e);
        }
        result
    }

    /// Whether initialization already completed successfully
    pub fn is_ready(&self) -> bool {
        self.memo.get(&()).is_some()
    }
}

/// Bring up Oniguruma and check that it handles the grammar dialect
async fn init_onig() -> Result<Arc<dyn ScannerLib>> {
    debug!("Initializing Oniguruma scanner backend");

    let probe = tokio::task::spawn_blocking(|| {
        let lib = OnigLib::new();
        let matcher = lib
            .compile_patterns(&[PROBE_PATTERN.to_string()])
            .map_err(|e| ScopeError::BackendUnavailable(e.to_string()))?;
        let line = lib.wrap_line("xa1f");
        match matcher.find_next_match(&line, 2) {
            Some(m) if m.start() == 2 && m.end() == 4 => Ok(lib),
            other => Err(ScopeError::BackendUnavailable(format!(
                "probe pattern matched {:?}",
                other.map(|m| (m.start(), m.end()))
            ))),
        }
    })
    .await
    .map_err(|e| ScopeError::BackendUnavailable(e.to_string()))?;

    let lib = probe?;
    info!("Oniguruma {} ready", OnigLib::version());
    Ok(Arc::new(lib))
}
