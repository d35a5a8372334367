//! Error types for parsing and configuration.

use thiserror::Error;

/// Errors produced while parsing spec strings and provider ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("wrong node group configuration: {0}, expected minSize:maxSize:groupIdentifier")]
    NodeGroupFormat(String),

    #[error("failed to set min size: {0}, expected integer")]
    MinSize(String),

    #[error("min size must be >= 1, got {0}")]
    MinSizeTooSmall(i64),

    #[error("failed to set max size: {0}, expected integer")]
    MaxSize(String),

    #[error("max size must be greater or equal to min size (min {min}, max {max})")]
    MaxBelowMin { min: u32, max: u32 },

    #[error("wrong id: expected format {expected}, got {got}")]
    ProviderId { expected: String, got: String },

    #[error("wrong group identifier: expected format {expected}, got {got}")]
    GroupId { expected: String, got: String },

    #[error("invalid duration: {0}")]
    Duration(String),
}

/// Errors produced while loading `nodescale.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("provider #{index} ({kind}): {source}")]
    Provider {
        index: usize,
        kind: String,
        #[source]
        source: ParseError,
    },

    #[error("provider #{index} ({kind}) is missing required field `{field}`")]
    MissingField {
        index: usize,
        kind: String,
        field: &'static str,
    },

    #[error("invalid `{field}`: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("`{field}` must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("no providers configured")]
    NoProviders,
}
