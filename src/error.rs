//! Error types for state graph operations

use thiserror::Error;

/// Errors that can occur while rewriting or inspecting a state graph
#[derive(Error, Debug)]
pub enum Error {
    /// A state key or resource address could not be parsed
    #[error("malformed resource identity {key:?}: {reason}")]
    KeyParse { key: String, reason: &'static str },

    /// An address is missing its resource type or name
    #[error("incomplete resource address {0:?}")]
    IncompleteAddress(String),

    /// Two explicitly mapped resources target the same destination address
    #[error("address collision for {0:?}")]
    AddressCollision(String),

    /// A dependency-inference source attribute produced more than one value
    #[error("multiple source values for {src_type}.{src_attr}")]
    AmbiguousSource { src_type: String, src_attr: String },

    /// An attribute path descends through a scalar value
    #[error("attribute path {path:?} crosses a scalar in {resource_type}")]
    AttributePath { resource_type: String, path: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for state graph operations
pub type Result<T> = std::result::Result<T, Error>;
