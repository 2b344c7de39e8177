//! Integration tests for grammar loading: shared in-flight loads, backend
//! memoization and file-system grammar sources

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use embedscope_core::config::GrammarSettings;
use embedscope_core::{
    GrammarRegistry, GrammarTable, Position, ScannerBackend, ScopeError, ScopeService, Settings,
};
use embedscope_grammar::{OnigLib, ScannerLib};
use tempfile::TempDir;

use common::{registry, CountingSource};

const HTML_GRAMMAR: &str = include_str!("../syntaxes/html.tmLanguage.json");
const JS_GRAMMAR: &str = include_str!("../syntaxes/javascript.tmLanguage.json");
const CSS_GRAMMAR: &str = include_str!("../syntaxes/css.tmLanguage.json");

/// Write the bundled grammars into a temporary `syntaxes/` directory
fn grammar_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let syntaxes = dir.path().join("syntaxes");
    std::fs::create_dir(&syntaxes).unwrap();
    std::fs::write(syntaxes.join("html.tmLanguage.json"), HTML_GRAMMAR).unwrap();
    std::fs::write(syntaxes.join("javascript.tmLanguage.json"), JS_GRAMMAR).unwrap();
    std::fs::write(syntaxes.join("css.tmLanguage.json"), CSS_GRAMMAR).unwrap();
    dir
}

fn fs_settings(dir: &TempDir) -> Settings {
    Settings {
        grammars: GrammarSettings {
            dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        },
        ..Default::default()
    }
}

// ==================== IN-FLIGHT LOADS ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_read_each_grammar_once() {
    let source = Arc::new(CountingSource::with_delay(Duration::from_millis(20)));
    let registry = registry(Arc::clone(&source));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.load_grammar("text.html.basic").await })
        })
        .collect();

    let mut grammars = Vec::new();
    for task in tasks {
        grammars.push(task.await.unwrap().unwrap());
    }

    assert_eq!(source.reads(), 3);
    assert!(grammars.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));

    let mut locations = source.locations();
    locations.sort();
    assert_eq!(
        locations,
        vec![
            "syntaxes/css.tmLanguage.json",
            "syntaxes/html.tmLanguage.json",
            "syntaxes/javascript.tmLanguage.json",
        ]
    );
}

#[tokio::test]
async fn test_unmapped_scope_is_rejected_before_reading() {
    let source = Arc::new(CountingSource::new());
    let registry = registry(Arc::clone(&source));

    let err = registry
        .try_load_grammar("source.unknown-lang")
        .await
        .unwrap_err();

    assert_eq!(err, ScopeError::UnmappedScope("source.unknown-lang".to_string()));
    assert_eq!(source.reads(), 0);
}

// ==================== BACKEND ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_backend_initializes_once_under_contention() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let backend = Arc::new(ScannerBackend::with_loader(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Arc::new(OnigLib::new()) as Arc<dyn ScannerLib>)
        })
    }));

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.get().await.is_ok() })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(backend.is_ready());
}

#[tokio::test]
async fn test_backend_failure_reaches_grammar_loads_and_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let backend = Arc::new(ScannerBackend::with_loader(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if attempt == 0 {
                Err(ScopeError::BackendUnavailable("wasm not loaded".to_string()))
            } else {
                Ok(Arc::new(OnigLib::new()) as Arc<dyn ScannerLib>)
            }
        })
    }));
    let registry = GrammarRegistry::new(
        GrammarTable::default(),
        Arc::new(CountingSource::new()),
        backend,
    );

    assert_eq!(
        registry.try_load_grammar("source.css").await.unwrap_err(),
        ScopeError::BackendUnavailable("wasm not loaded".to_string())
    );
    assert!(registry.cached("source.css").is_none());

    assert!(registry.load_grammar("source.css").await.is_some());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

// ==================== FILE-SYSTEM GRAMMARS ====================

#[tokio::test]
async fn test_service_reads_grammars_from_directory() {
    let dir = grammar_dir();
    let service = ScopeService::from_settings(&fs_settings(&dir));
    let doc = ["<div>", "<script>", "var x = 1;", "</script>", "</div>"];

    let scopes = service
        .scopes_at(&doc[..], Position::new(2, 0), None)
        .await
        .unwrap();

    assert!(scopes.contains(&"source.js".to_string()));
}

#[tokio::test]
async fn test_broken_grammar_is_not_cached() {
    let dir = grammar_dir();
    let css = dir.path().join("syntaxes/css.tmLanguage.json");
    std::fs::write(&css, "{ not json").unwrap();

    let service = ScopeService::from_settings(&fs_settings(&dir));
    let doc = ["p { color: red; }"];

    let broken = service
        .scopes_at(&doc[..], Position::new(0, 0), Some("source.css"))
        .await;
    assert_eq!(broken, None);

    std::fs::write(&css, CSS_GRAMMAR).unwrap();
    let fixed = service
        .scopes_at(&doc[..], Position::new(0, 0), Some("source.css"))
        .await;
    assert_eq!(
        fixed,
        Some(vec!["source.css".to_string(), "entity.name.tag.css".to_string()])
    );
}

#[tokio::test]
async fn test_missing_embedded_grammar_leaves_region_plain() {
    let dir = grammar_dir();
    std::fs::remove_file(dir.path().join("syntaxes/javascript.tmLanguage.json")).unwrap();

    let service = ScopeService::from_settings(&fs_settings(&dir));
    let doc = ["<script>", "var x = 1;"];

    let scopes = service
        .scopes_at(&doc[..], Position::new(1, 0), None)
        .await
        .unwrap();

    assert_eq!(
        scopes,
        vec![
            "text.html.basic".to_string(),
            "meta.embedded.block.html".to_string(),
            "source.js".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_host_compiled_without_embedded_grammar_stays_cached() {
    let dir = grammar_dir();
    let js_path = dir.path().join("syntaxes/javascript.tmLanguage.json");
    std::fs::remove_file(&js_path).unwrap();

    let service = ScopeService::from_settings(&fs_settings(&dir));
    let page = ["<script>", "var x = 1;"];
    let before = service
        .scopes_at(&page[..], Position::new(1, 0), None)
        .await
        .unwrap();

    std::fs::write(&js_path, JS_GRAMMAR).unwrap();
    let after = service
        .scopes_at(&page[..], Position::new(1, 0), None)
        .await
        .unwrap();
    let script = ["var x = 1;"];
    let standalone = service
        .scopes_at(&script[..], Position::new(0, 0), Some("source.js"))
        .await
        .unwrap();

    assert_eq!(after, before);
    assert_eq!(after.last().unwrap(), "source.js");
    assert_eq!(
        standalone,
        vec!["source.js".to_string(), "storage.type.js".to_string()]
    );
}

#[tokio::test]
async fn test_custom_scope_table() {
    let dir = grammar_dir();
    let toml = format!(
        r#"
root_scope = "source.css"

[grammars]
dir = "{}"

[grammars.scopes]
"source.css" = "syntaxes/css.tmLanguage.json"
"#,
        dir.path().display().to_string().replace('\\', "/")
    );
    let settings = Settings::from_toml_str(&toml).unwrap();
    let service = ScopeService::from_settings(&settings);
    let doc = ["a { }"];

    assert_eq!(service.root_scope(), "source.css");
    assert!(service
        .scopes_at(&doc[..], Position::new(0, 0), None)
        .await
        .is_some());
    assert_eq!(
        service
            .scopes_at(&doc[..], Position::new(0, 0), Some("text.html.basic"))
            .await,
        None
    );
}
