//! # embedscope-grammar
//!
//! TextMate grammar support for embedscope: parse `*.tmLanguage.json`
//! grammars, compile them into a rule arena, and tokenize documents line by
//! line while threading the lexical state from one line into the next.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::{collections::HashMap, sync::Arc};
//! use embedscope_grammar::{Grammar, OnigLib, RawGrammar, RuleStack};
//!
//! let raw = RawGrammar::from_json("html.json", &json)?;
//! let grammars = HashMap::from([(raw.scope_name.clone(), Arc::new(raw))]);
//! let grammar = Grammar::compile("text.html.basic", &grammars, Arc::new(OnigLib::new()))?;
//!
//! let mut state = RuleStack::initial();
//! for line in text.lines() {
//!     let result = grammar.tokenize_line(line, &state)?;
//!     state = result.rule_stack;
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

mod compile;
pub mod error;
mod grammar;
mod names;
pub mod raw;
mod rule;
pub mod scanner;
mod stack;
mod tokenizer;

pub use error::{GrammarError, Result};
pub use grammar::Grammar;
pub use raw::{RawGrammar, RawRule};
pub use scanner::{MatchLine, Matcher, OnigLib, ScanMatch, ScannerLib};
pub use stack::RuleStack;
pub use tokenizer::{LineTokens, Token};

/// Raw grammars available to [`Grammar::compile`], keyed by scope name
pub type RawGrammarSet = HashMap<String, Arc<RawGrammar>>;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
