//! Error types for star record storage, matching and merging

use crate::schema::PropertyType;
use starfuse_core::CoordinateError;
use thiserror::Error;

/// Result type for star record operations
pub type StarResult<T> = Result<T, StarError>;

/// Errors returned by the record store, the match engine and the merge engine.
///
/// Properties are named by schema index; `PropertySchema::descriptor` maps
/// an index back to its id when a caller wants to log it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StarError {
    #[error("property #{index} is not set")]
    NotSet { index: usize },

    #[error("property #{index} holds {actual} values, {requested} requested")]
    TypeMismatch {
        index: usize,
        actual: PropertyType,
        requested: PropertyType,
    },

    #[error("missing coordinate: {0}")]
    MissingCoordinate(&'static str),

    #[error("schema mismatch: {left} vs {right} properties")]
    SchemaMismatch { left: usize, right: usize },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid value for property #{index}: {reason}")]
    InvalidValue { index: usize, reason: String },

    #[error("coordinate error: {0}")]
    Coordinate(#[from] CoordinateError),
}
