//! Comment style selection

use std::fmt;

use serde::{Deserialize, Serialize};

/// The comment syntax that applies inside a scope stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStyle {
    /// `// ...` in script regions
    Line,
    /// `/* ... */` in style regions
    Block,
    /// `<!-- ... -->` everywhere else
    Markup,
}

impl CommentStyle {
    /// Classify a scope stack.
    ///
    /// Script scopes win over style scopes; no stack at all means markup.
    pub fn for_scopes<S: AsRef<str>>(scopes: Option<&[S]>) -> Self {
        let Some(scopes) = scopes else {
            return CommentStyle::Markup;
        };
        let lowered: Vec<String> = scopes
            .iter()
            .map(|scope| scope.as_ref().to_lowercase())
            .collect();

        if lowered
            .iter()
            .any(|s| s.contains("javascript") || s.contains("source.js"))
        {
            CommentStyle::Line
        } else if lowered
            .iter()
            .any(|s| s.contains("css") || s.contains("source.css"))
        {
            CommentStyle::Block
        } else {
            CommentStyle::Markup
        }
    }

    pub fn open(self) -> &'static str {
        match self {
            CommentStyle::Line => "//",
            CommentStyle::Block => "/*",
            CommentStyle::Markup => "<!--",
        }
    }

    /// Closing marker; line comments have none
    pub fn close(self) -> Option<&'static str> {
        match self {
            CommentStyle::Line => None,
            CommentStyle::Block => Some("*/"),
            CommentStyle::Markup => Some("-->"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommentStyle::Line => "line",
            CommentStyle::Block => "block",
            CommentStyle::Markup => "markup",
        }
    }
}

impl fmt::Display for CommentStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.close() {
            Some(close) => write!(f, "{} {} {}", self.name(), self.open(), close),
            None => write!(f, "{} {}", self.name(), self.open()),
        }
    }
}
