//! Error types for scene expansion.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for expansion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Object not found by path
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Property not found by name
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// Type mismatch when reading data
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Sample index out of bounds
    #[error("Sample index {index} out of bounds (count: {count})")]
    SampleOutOfBounds { index: usize, count: usize },

    /// Invalid data structure in the scene graph
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// Instance whose master cannot be used
    #[error("Invalid instance {path}: {reason}")]
    InvalidInstance { path: String, reason: String },

    /// Archive could not be opened
    #[error("Cannot open archive {path}: {reason}")]
    ArchiveOpen { path: PathBuf, reason: String },

    /// Shape produced no usable geometry
    #[error("No geometry for {path}: {reason}")]
    NoGeometry { path: String, reason: String },

    /// The builder of a shared shape published a failure
    #[error("Build failed for {key}: {reason}")]
    BuildFailed { key: String, reason: String },

    /// A builder asked for the key it is currently building
    #[error("Re-entrant build request for {0}")]
    ReentrantBuild(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (settings or archive dump) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a "no geometry" error for a shape.
    pub fn no_geometry(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoGeometry {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for structural failures that should turn into an empty shape.
    pub fn is_no_geometry(&self) -> bool {
        matches!(self, Self::NoGeometry { .. })
    }
}

/// Result type alias for expansion operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::no_geometry("/a/mesh", "zero faces");
        assert!(e.to_string().contains("/a/mesh"));
        assert!(e.to_string().contains("zero faces"));
        assert!(e.is_no_geometry());

        let e = Error::SampleOutOfBounds { index: 5, count: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));
        assert!(!e.is_no_geometry());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
