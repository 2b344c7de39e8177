//! embedscope-core - which language is the cursor in?
//!
//! Resolves the TextMate scope stack at a position in a document that embeds
//! languages in one another (JavaScript and CSS inside HTML), and picks the
//! comment style that applies there.
//!
//! # Example
//!
//! ```no_run
//! use embedscope_core::{CommentStyle, Position, ScopeService, TextDocument};
//!
//! # async fn demo() {
//! let doc = TextDocument::new("<script>\n  var x = 1;\n</script>");
//! let service = ScopeService::default();
//!
//! let style = service
//!     .comment_style_at(&doc, Position::new(1, 2), None)
//!     .await;
//! assert_eq!(style, CommentStyle::Line);
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod backend;
pub mod cache;
pub mod comment;
pub mod config;
pub mod document;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod source;

// Re-export main types
pub use backend::ScannerBackend;
pub use cache::InFlight;
pub use comment::CommentStyle;
pub use config::Settings;
pub use document::{utf16_len, DocumentView, Position, TextDocument};
pub use error::{Result, ScopeError};
pub use registry::GrammarRegistry;
pub use resolver::{scopes_at, ScopeResolver, DEFAULT_MAX_LINE_LENGTH};
pub use service::ScopeService;
pub use source::{BundledGrammarSource, FsGrammarSource, GrammarSource, GrammarTable};

pub use embedscope_grammar::{RuleStack, Token};

/// Future returned by a [`ScannerBackend`] loader
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "1.0.0");
    }
}
