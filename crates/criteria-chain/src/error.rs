//! Error types for chained element id parsing.

use thiserror::Error;

/// Errors that can occur while tokenizing or parsing a chained element id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Empty input provided.
    #[error("empty element id")]
    Empty,

    /// A closing parenthesis without a matching opening one.
    #[error("unexpected ')' at position {position}")]
    UnmatchedClose {
        /// Byte offset of the offending parenthesis.
        position: usize,
    },

    /// An opening parenthesis that is never closed.
    #[error("missing closing parenthesis for '(' at position {position}")]
    UnclosedOpen {
        /// Byte offset of the unclosed parenthesis.
        position: usize,
    },

    /// A parenthesised group without content, e.g. `()`.
    #[error("empty group at position {position}")]
    EmptyGroup {
        /// Byte offset of the opening parenthesis.
        position: usize,
    },

    /// A token that is not allowed at this point of the chain.
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken {
        /// Byte offset of the token.
        position: usize,
        /// The offending token text.
        token: String,
    },

    /// Tokenizer failure.
    #[error("tokenize error at position {position}: {message}")]
    Tokenize {
        /// Position in the input where the error occurred.
        position: usize,
        /// Description of the error.
        message: String,
    },
}

/// Result type for chain parsing.
pub type ChainResult<T> = std::result::Result<T, ChainError>;
