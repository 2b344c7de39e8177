//! embedscope CLI - Command-line interface library
//!
//! This library provides the CLI functionality for embedscope:
//! - Scopes: print the scope stack at a position
//! - Comment style: print the comment syntax that applies at a position
//! - Tokens: dump the tokens of a document
//!
//! # Library Usage
//!
//! ```ignore
//! use embedscope_cli::{run_cli, scopes_command, OutputFormat};
//!
//! // Run the full CLI
//! run_cli();
//!
//! // Or use individual commands programmatically
//! let text = scopes_command(&input, Position::new(2, 0), None, OutputFormat::Json, &settings).await?;
//! ```
//!
//! # Binary Usage
//!
//! ```bash
//! # Scopes at line 2, column 0
//! embedscope scopes page.html --line 2 --character 0
//!
//! # Comment style as JSON
//! embedscope comment-style page.html -l 2 -c 0 --format json
//!
//! # Tokens of line 5, with debug logging
//! RUST_LOG=debug embedscope tokens page.html --line 5
//! ```

pub mod app;

// Re-export main entry point and types
pub use app::{comment_style_command, load_settings, scopes_command, tokens_command};
pub use app::{run_cli, OutputFormat};
