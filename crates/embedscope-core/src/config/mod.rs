//! Configuration
//!
//! Settings are loaded from `embedscope.toml`:
//!
//! ```toml
//! root_scope = "text.html.basic"
//!
//! [limits]
//! max_line_length = 10000
//!
//! [grammars]
//! dir = "/opt/embedscope"
//!
//! [grammars.scopes]
//! "text.html.basic" = "syntaxes/html.tmLanguage.json"
//! "source.js" = "syntaxes/javascript.tmLanguage.json"
//! ```
//!
//! Without `grammars.dir` the bundled grammars are used. An empty
//! `grammars.scopes` table keeps the default scope table.

mod settings;


pub use settings::{GrammarSettings, LimitSettings, Settings, DEFAULT_CONFIG_FILE};
