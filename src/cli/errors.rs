//! CLI-specific error types
//!
//! Every CLI error exits with status 1. Rejections keep the code of the
//! library error that caused them.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::path::PathError;
use crate::pipeline::PipelineError;
use crate::query::QueryError;
use crate::schema::SchemaError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// Schema catalog error
    SchemaError,
    /// I/O error (stdin/stdout)
    IoError,
    /// Input document failed validation
    Rejected,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SHAPE_CLI_CONFIG_ERROR",
            Self::SchemaError => "SHAPE_CLI_SCHEMA_ERROR",
            Self::IoError => "SHAPE_CLI_IO_ERROR",
            Self::Rejected => "SHAPE_CLI_REJECTED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    /// Code of the library error behind a rejection
    cause: Option<&'static str>,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            cause: None,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn schema_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::SchemaError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Validation failure carrying the library error code
    pub fn rejected(cause: &'static str, msg: impl Into<String>) -> Self {
        Self {
            code: CliErrorCode::Rejected,
            cause: Some(cause),
            message: msg.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Code reported to the caller: the cause for rejections, else the CLI code
    pub fn code_str(&self) -> &'static str {
        self.cause.unwrap_or_else(|| self.code.code())
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit status
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        Self::schema_error(e.to_string())
    }
}

impl From<PathError> for CliError {
    fn from(e: PathError) -> Self {
        Self::rejected(e.code(), e.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        Self::rejected(e.code().code(), e.message())
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        Self::rejected(e.code().code(), e.message())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_cause_code() {
        let err: CliError = QueryError::unknown_operator("$frob", "filter").into();
        assert_eq!(err.code(), &CliErrorCode::Rejected);
        assert_eq!(err.code_str(), "SHAPE_UNKNOWN_OPERATOR");
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("SHAPE_UNKNOWN_OPERATOR: "));
    }

    #[test]
    fn test_plain_codes() {
        let err = CliError::io_error("Empty input");
        assert_eq!(err.code_str(), "SHAPE_CLI_IO_ERROR");
        assert_eq!(err.to_string(), "SHAPE_CLI_IO_ERROR: Empty input");
    }
}
