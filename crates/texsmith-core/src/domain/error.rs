//! Error taxonomy for a pipeline run.
//!
//! Every variant here is converted into a [`PipelineResult`] by the
//! pipeline; none of them escapes as a panic or a process exit.
//!
//! [`PipelineResult`]: crate::domain::PipelineResult

use serde::{Deserialize, Serialize};

use crate::compiler::CompileFailure;
use crate::generation::GenerationError;

/// Malformed or oversized input. Fatal immediately, no attempt consumed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("max_tokens must be greater than zero")]
    ZeroTokenBudget,

    #[error("image name {name:?} is not a bare file name")]
    InvalidImageName { name: String },

    #[error("image {name:?} is not valid base64: {reason}")]
    InvalidImageEncoding { name: String, reason: String },

    #[error("too many images: {count} (limit {limit})")]
    TooManyImages { count: usize, limit: usize },

    #[error("image payload too large: {total_bytes} bytes (limit {limit_bytes})")]
    ImagesTooLarge {
        total_bytes: usize,
        limit_bytes: usize,
    },

    #[error("callback url must be an http(s) url: {url:?}")]
    InvalidCallbackUrl { url: String },
}

/// Terminal errors of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The generation service could not be reached or refused the call.
    #[error("generation service error: {0}")]
    Transport(#[from] GenerationError),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The error-repair budget was consumed without a successful compile.
    #[error("compilation failed after {attempts} attempt(s): {}", failure.diagnostic)]
    Exhausted {
        attempts: u32,
        failure: CompileFailure,
        last_source: String,
    },
}

/// Coarse failure class reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Validation,
    Exhausted,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Transport(_) => FailureKind::Transport,
            PipelineError::Validation(_) => FailureKind::Validation,
            PipelineError::Exhausted { .. } => FailureKind::Exhausted,
        }
    }

    /// Text placed in the result's `diagnostic` field.
    pub fn diagnostic(&self) -> String {
        match self {
            PipelineError::Exhausted { failure, .. } => failure.diagnostic.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileFailureKind;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::ImagesTooLarge {
            total_bytes: 2048,
            limit_bytes: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));

        let err = ValidationError::EmptyField {
            field: "user_prompt",
        };
        assert_eq!(err.to_string(), "user_prompt must not be empty");
    }

    #[test]
    fn test_exhausted_diagnostic_is_last_compile_failure() {
        let err = PipelineError::Exhausted {
            attempts: 5,
            failure: CompileFailure::new(CompileFailureKind::Engine, "! Undefined control sequence."),
            last_source: String::new(),
        };
        assert_eq!(err.kind(), FailureKind::Exhausted);
        assert_eq!(err.diagnostic(), "! Undefined control sequence.");
        assert!(err.to_string().contains("5 attempt(s)"));
    }

    #[test]
    fn test_transport_kind() {
        let err = PipelineError::from(GenerationError::Transport("connection reset".into()));
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.diagnostic().contains("connection reset"));
    }
}
