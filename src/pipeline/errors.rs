//! Pipeline error types
//!
//! Error codes:
//! - SHAPE_STAGE_VALIDATION (REJECT)
//! - SHAPE_TERMINAL_STAGE (REJECT)

use std::fmt;
use std::sync::Arc;

use crate::query::QueryError;
use crate::schema::{SchemaNode, Severity};

/// Pipeline-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorCode {
    /// A stage's arguments do not fit the schema flowing into it
    StageValidation,
    /// `$out` or `$merge` somewhere other than last
    TerminalStage,
}

impl PipelineErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineErrorCode::StageValidation => "SHAPE_STAGE_VALIDATION",
            PipelineErrorCode::TerminalStage => "SHAPE_TERMINAL_STAGE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PipelineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Pipeline error with the stage it concerns
#[derive(Debug, Clone)]
pub struct PipelineError {
    code: PipelineErrorCode,
    message: String,
    /// Position of the rejected stage, relative to its own pipeline
    stage_index: usize,
    /// Stage name including the `$`
    stage: String,
    path: Option<String>,
    /// Schema flowing into the rejected stage
    available: Option<Arc<SchemaNode>>,
    cause: Option<QueryError>,
}

impl PipelineError {
    /// Stage rejected by the schema flowing into it
    pub fn stage_validation(
        stage_index: usize,
        stage: impl Into<String>,
        available: &Arc<SchemaNode>,
        cause: QueryError,
    ) -> Self {
        let stage = stage.into();
        Self {
            code: PipelineErrorCode::StageValidation,
            message: format!("stage {} ({}): {}", stage_index, stage, cause.message()),
            stage_index,
            stage,
            path: cause.path().map(str::to_string),
            available: Some(available.clone()),
            cause: Some(cause),
        }
    }

    /// Terminal stage found before the end of the pipeline
    pub fn terminal_stage(stage_index: usize, stage: impl Into<String>) -> Self {
        let stage = stage.into();
        Self {
            code: PipelineErrorCode::TerminalStage,
            message: format!(
                "stage {} ({}) must be the last stage of the pipeline",
                stage_index, stage
            ),
            stage_index,
            stage,
            path: None,
            available: None,
            cause: None,
        }
    }

    pub fn code(&self) -> PipelineErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Offending path, if the cause names one
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Schema the rejected stage was validated against
    pub fn available(&self) -> Option<&Arc<SchemaNode>> {
        self.available.as_ref()
    }

    pub fn cause(&self) -> Option<&QueryError> {
        self.cause.as_ref()
    }

    /// Stable code of the underlying cause, or of this error
    pub fn cause_code(&self) -> &'static str {
        match &self.cause {
            Some(cause) => cause.code().code(),
            None => self.code.code(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
