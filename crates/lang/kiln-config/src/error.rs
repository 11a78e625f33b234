//! Error and diagnostic types for the config language.

use std::path::PathBuf;

use thiserror::Error;

use crate::lexer::Span;

/// A fatal error raised while reading or parsing a config file.
///
/// Every syntax error names the file and the 1-based line it was found on.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// A character that cannot start any token.
    #[error("{span}: unexpected character '{ch}'")]
    UnexpectedCharacter {
        /// Where the character was found.
        span: Span,
        /// The offending character.
        ch: char,
    },

    /// A quoted string without its closing quote.
    #[error("{span}: unterminated string")]
    UnterminatedString {
        /// Opening quote.
        span: Span,
    },

    /// A `[group]` marker without its closing bracket.
    #[error("{span}: unterminated group name")]
    UnterminatedGroup {
        /// Opening bracket.
        span: Span,
    },

    /// A token that does not fit the grammar at this point.
    #[error("{span}: unexpected token '{found}'")]
    UnexpectedToken {
        /// Location of the token.
        span: Span,
        /// The token as written.
        found: String,
    },

    /// The input ended in the middle of a statement or block.
    #[error("{span}: unexpected end of input")]
    UnexpectedEnd {
        /// Last position read.
        span: Span,
    },

    /// A `[group]` marker inside an `if`/`else` block.
    #[error("{span}: groups cannot be nested inside conditionals")]
    NestedGroup {
        /// Location of the marker.
        span: Span,
    },

    /// `a < b < c` and friends.
    #[error("{span}: comparison operators cannot be chained")]
    ChainedComparison {
        /// Location of the second operator.
        span: Span,
    },

    /// A `$(` with no closing `)` in a value or string literal.
    #[error("{span}: unterminated `$(` substitution in '{value}'")]
    UnterminatedSubstitution {
        /// Location of the value.
        span: Span,
        /// The value as written.
        value: String,
    },

    /// A `$(` with no closing `)` in a value injected through
    /// [`ConfigFile::set_or_add_value`](crate::ConfigFile::set_or_add_value).
    #[error("unterminated `$(` substitution in injected value {group}.{key} = '{value}'")]
    UnterminatedInjected {
        /// Group the value was injected into.
        group: String,
        /// Key the value was injected under.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// A non-fatal problem found while resolving values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What went wrong, naming the value involved.
    pub message: String,
    /// Where the offending value was declared, if it came from source text.
    pub location: Option<Span>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(span) => write!(f, "{span}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
