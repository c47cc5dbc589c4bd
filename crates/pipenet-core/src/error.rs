//! Unified error type for the pipe network model.
//!
//! [`PipeNetError`] covers the failures that can occur while building,
//! validating, or decomposing a [`Network`](crate::Network). Algorithm crates
//! wrap it in their own error enums and convert with `?`.
//!
//! # Example
//!
//! ```ignore
//! use pipenet_core::{PipeNetError, PipeNetResult};
//!
//! fn prepare(network: &Network) -> PipeNetResult<()> {
//!     validate_network(network).into_result()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for pipe network operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipeNetError {
    /// Referential inconsistency in the graph: dangling endpoints, self-loops,
    /// a root that cannot be located, a node owned by zero or two pieces.
    ///
    /// These always point at a defect in whatever built the graph.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Data validation errors (negative lengths, non-finite loads, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using PipeNetError.
pub type PipeNetResult<T> = Result<T, PipeNetError>;

impl PipeNetError {
    /// Shorthand for a structural precondition violation.
    pub fn structural(message: impl Into<String>) -> Self {
        PipeNetError::Structural(message.into())
    }

    /// True for errors that indicate a malformed input graph.
    pub fn is_structural(&self) -> bool {
        matches!(self, PipeNetError::Structural(_))
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for PipeNetError {
    fn from(err: anyhow::Error) -> Self {
        PipeNetError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for PipeNetError {
    fn from(s: String) -> Self {
        PipeNetError::Other(s)
    }
}

impl From<&str> for PipeNetError {
    fn from(s: &str) -> Self {
        PipeNetError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipeNetError::Structural("pipe 7 references missing junction".into());
        assert!(err.to_string().contains("Structural error"));
        assert!(err.to_string().contains("missing junction"));
    }

    #[test]
    fn test_structural_shorthand() {
        let err = PipeNetError::structural("root not found");
        assert!(err.is_structural());
        assert!(!PipeNetError::Config("x".into()).is_structural());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: PipeNetError = anyhow::anyhow!("boom").into();
        assert_eq!(err, PipeNetError::Other("boom".into()));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> PipeNetResult<()> {
            Err(PipeNetError::Validation("test".into()))
        }

        fn outer() -> PipeNetResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
