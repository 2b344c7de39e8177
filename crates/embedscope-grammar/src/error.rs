//! Error types for grammar compilation and tokenization.

use thiserror::Error;

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Errors raised while parsing, compiling or running a grammar.
///
/// Every variant carries owned strings so a single failure can be cloned
/// and handed to each task waiting on the same grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// Grammar source is not valid JSON or does not match the grammar shape
    #[error("Invalid grammar {name}: {reason}")]
    InvalidGrammar { name: String, reason: String },

    /// The grammar requested for compilation was never supplied
    #[error("Grammar not provided: {0}")]
    MissingGrammar(String),

    /// A `match`, `begin`, `end` or `while` pattern was rejected by the scanner
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
