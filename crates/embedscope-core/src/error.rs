//! Error types for grammar loading and scope resolution.

use embedscope_grammar::GrammarError;
use thiserror::Error;

/// Result type for scope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Errors raised while preparing a grammar for resolution.
///
/// Cloneable: a load shared by several callers hands the same error to each
/// of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The pattern-matching backend could not be initialized
    #[error("Scanner backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No grammar source is configured for the scope
    #[error("No grammar path found for scope {0}")]
    UnmappedScope(String),

    /// The grammar source could not be read
    #[error("Failed to read grammar {location}: {reason}")]
    Read { location: String, reason: String },

    /// The grammar could not be parsed, compiled or run
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    /// The task loading this value was dropped before it finished
    #[error("Load of {0} was abandoned")]
    Abandoned(String),
}
