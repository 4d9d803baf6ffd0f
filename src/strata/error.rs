//! Error types shared by every stage of the engine
//!
//!     Compile-time failures (lexing, node classification, inheritance resolution, linking)
//!     abort the whole compile: no partial template is produced or cached. Render-time
//!     failures carry the [Position] of the instruction that raised them, which always
//!     refers to the original template source, never to the compiled program.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// A location in an original template source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Where the template came from: a file path, or a name for in-memory templates
    pub origin: Arc<str>,
    /// 1-based line number
    pub line: usize,
}

impl Position {
    pub fn new(origin: impl Into<Arc<str>>, line: usize) -> Self {
        Self {
            origin: origin.into(),
            line,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.line)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The template name could not be resolved against any of the search roots
    #[error("template '{name}' not found under {roots:?}")]
    UnknownTemplate { roots: Vec<PathBuf>, name: String },

    /// A syntax definition with missing, empty or clashing delimiters
    #[error("invalid syntax definition: {0}")]
    InvalidSyntax(String),

    /// A tag was opened but its braces never balanced
    #[error("{origin}:{line}: {message}")]
    Lex {
        origin: Arc<str>,
        line: usize,
        message: String,
    },

    /// A statement or inheritance structure could not be compiled
    #[error("{origin}:{line}: compilation failed: {message}")]
    Compilation {
        origin: Arc<str>,
        line: usize,
        message: String,
    },

    /// `blocksuper` used in a template that does not extend anything
    #[error("{origin}:{line}: blocksuper in block '{block}' but the template has no parent")]
    InvalidSuperCall {
        origin: Arc<str>,
        line: usize,
        block: String,
    },

    /// A syntax conversion whose output would not read back as the same template
    #[error("{origin}:{line}: cannot convert without changing the template: {message}")]
    Conversion {
        origin: Arc<str>,
        line: usize,
        message: String,
    },

    /// A variable lookup missed under the strict policy
    #[error("{position}: undefined variable '{name}'")]
    MissingVariable { name: String, position: Position },

    /// An expression or statement failed while rendering
    #[error("{position}: {message}")]
    Runtime { position: Position, message: String },

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub(crate) fn compilation(origin: &Arc<str>, line: usize, message: impl Into<String>) -> Self {
        Error::Compilation {
            origin: origin.clone(),
            line,
            message: message.into(),
        }
    }

    /// Source position the error is attributed to, when it has one
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Lex { origin, line, .. }
            | Error::Compilation { origin, line, .. }
            | Error::InvalidSuperCall { origin, line, .. }
            | Error::Conversion { origin, line, .. } => {
                Some(Position::new(origin.clone(), *line))
            }
            Error::MissingVariable { position, .. } | Error::Runtime { position, .. } => {
                Some(position.clone())
            }
            Error::UnknownTemplate { .. }
            | Error::InvalidSyntax(_)
            | Error::Io { .. }
            | Error::Config(_) => None,
        }
    }
}
