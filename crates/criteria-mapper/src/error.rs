//! Error types for mapping generation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving, translating or assembling a mapping.
#[derive(Error, Debug)]
pub enum MappingError {
    /// Chained element id could not be parsed.
    #[error("Grammar error: {0}")]
    Grammar(#[from] criteria_chain::ChainError),

    /// No element with this id in the profile snapshot.
    #[error("Element '{element_id}' not found in profile '{profile}'")]
    ElementNotFound {
        /// Name of the profile searched.
        profile: String,
        /// The element id looked up.
        element_id: String,
    },

    /// Extension or reference target profile could not be located.
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Chain continues through an element it cannot cross.
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// Polymorphic element declares several types and none can be chosen.
    #[error("Ambiguous type for '{element_id}': {types:?}")]
    AmbiguousType {
        /// The polymorphic element id.
        element_id: String,
        /// Declared type codes.
        types: Vec<String>,
    },

    /// Element declares no type at all.
    #[error("Element '{0}' declares no type")]
    MissingElementType(String),

    /// No search parameter matches after all fallbacks.
    #[error("No search parameter found for {expressions:?}")]
    SearchParameterNotFound {
        /// The unmatched expressions.
        expressions: Vec<String>,
    },

    /// Composite attribute did not resolve to exactly two elements.
    #[error("Composite attribute requires exactly 2 elements, got {count}")]
    CompositeArity {
        /// Number of resolved elements.
        count: usize,
    },

    /// Composite search parameter of an unsupported component type.
    #[error("Unsupported composite type: {0}")]
    UnsupportedCompositeType(String),

    /// Consecutive search parameters in a chain do not connect.
    #[error("Search parameter chain '{from}' -> '{to}' is invalid: targets {targets:?} do not include any base {bases:?}")]
    ChainValidity {
        /// Code of the referencing parameter.
        from: String,
        /// Code of the referenced parameter.
        to: String,
        /// Target resource types of `from`.
        targets: Vec<String>,
        /// Base resource types of `to`.
        bases: Vec<String>,
    },

    /// No term code could be derived for an element.
    #[error("No term code found for element '{0}'")]
    TermCodeNotFound(String),

    /// Querying metadata record failed validation.
    #[error("Invalid querying metadata '{name}': {reason}")]
    InvalidMetadata {
        /// Name of the offending record.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Model info document could not be read.
    #[error("Model info error: {0}")]
    ModelInfo(String),

    /// Reading an input file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An input document is not valid JSON for its expected shape.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// The offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl MappingError {
    /// Returns true if the error is scoped to a single criterion, so a batch
    /// run can log it and continue.
    ///
    /// I/O and model info failures affect every criterion of a run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MappingError::Io { .. } | MappingError::ModelInfo(_))
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = std::result::Result<T, MappingError>;
