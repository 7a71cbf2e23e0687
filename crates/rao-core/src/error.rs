//! Unified error type for the RAO crates
//!
//! [`RaoError`] covers everything that can go wrong before or around an
//! optimisation: reading case files, validating the action catalog,
//! applying actions to a network, talking to the MILP solver.
//!
//! Numerical failures of the sensitivity oracle are deliberately *not*
//! errors past a stage boundary: they surface as a `Failure` computation
//! status in the results.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{CoreResult, RaoError};
//!
//! fn check(crac: &Crac) -> CoreResult<()> {
//!     crac.validate()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all RAO operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (case files, parameter files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Catalog or data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// MILP solver errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Parameter errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network element lookups and action application
    #[error("Network error: {0}")]
    Network(String),

    /// Sensitivity oracle errors
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// A bounded wait expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type CoreResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for RaoError {
    fn from(err: toml::de::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for RaoError {
    fn from(err: toml::ser::Error) -> Self {
        RaoError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaoError::Solver("abnormal termination".into());
        assert!(err.to_string().contains("Solver error"));
        assert!(err.to_string().contains("abnormal termination"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "case not found");
        let err: RaoError = io_err.into();
        assert!(matches!(err, RaoError::Io(_)));
    }

    #[test]
    fn test_toml_error_is_parse_error() {
        let parse: Result<toml::Value, _> = toml::from_str("a = [");
        let err: RaoError = parse.unwrap_err().into();
        assert!(matches!(err, RaoError::Parse(_)), "toml errors map to Parse");
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> CoreResult<()> {
            Err(RaoError::Validation("unknown cnec".into()))
        }

        fn outer() -> CoreResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
