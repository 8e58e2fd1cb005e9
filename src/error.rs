//! Typed failures raised by the pipeline stages.
//!
//! Command handlers wrap these in `anyhow` with context; the stages themselves
//! return [`PipelineError`] so the driver can tell a retryable read failure
//! apart from everything that must abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unreadable or empty container, or layer enumeration failure.
    #[error("container error: {0}")]
    Container(String),
    /// Unresolvable required column or failed output-schema assertion.
    #[error("schema error: {0}")]
    Schema(String),
    /// I/O failure while loading a layer; the driver retries these once.
    #[error("transient I/O error: {message}")]
    TransientIo {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("reprojection error: {0}")]
    Reprojection(String),
    #[error("output error: {0}")]
    Output(String),
}

impl PipelineError {
    pub fn container(message: impl Into<String>) -> Self {
        PipelineError::Container(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        PipelineError::Schema(message.into())
    }

    pub fn transient(message: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::TransientIo {
            message: message.into(),
            source,
        }
    }

    pub fn output(message: impl Into<String>) -> Self {
        PipelineError::Output(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::TransientIo { .. })
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
