//! Error taxonomy for the generate → execute → classify → render pipeline.
//!
//! Every variant is caught at the orchestrator boundary and turned into a
//! single user-visible error state; none of them is fatal to the session.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A capability package could not be loaded. `initialize()` may be retried.
    #[error("runtime initialization failed while loading '{capability}': {reason}")]
    RuntimeInitialization { capability: String, reason: String },
    /// `run_source` was called before `initialize()` succeeded.
    #[error("the Python runtime is not ready yet")]
    RuntimeUninitialized,
    /// The evaluated script raised. The session stays usable.
    #[error("code execution error: {0}")]
    ScriptEvaluation(String),
    /// Evaluation exceeded its deadline and the interpreter was stopped.
    #[error("code execution timed out after {}s", .0.as_secs())]
    ExecutionTimeout(Duration),
    /// The interpreter process itself misbehaved (exited, broken pipe, bad frame).
    #[error("interpreter failure: {0}")]
    Interpreter(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("render error: {0}")]
    Render(String),
    /// A cycle is already in flight.
    #[error("a request is already running")]
    Busy,
}

/// Failures of the code generation collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("too many requests: {message}")]
    RateLimited { message: String },
    #[error("generation service returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("generation service is unreachable: {0}")]
    Unreachable(String),
    #[error("malformed generation response: {0}")]
    Malformed(String),
    #[error("generation service returned no code")]
    EmptyCode,
}

impl GenerationError {
    /// User-facing hint for errors that go away by waiting.
    pub fn retry_hint(&self) -> Option<&'static str> {
        match self {
            GenerationError::RateLimited { .. } => {
                Some("Please wait 1-2 minutes before sending the next request.")
            }
            _ => None,
        }
    }
}

impl PipelineError {
    /// Message shown in the status line and the error placeholder.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Generation(g) => match g.retry_hint() {
                Some(hint) => format!("{} {}", g, hint),
                None => g.to_string(),
            },
            PipelineError::RuntimeUninitialized => {
                "The Python runtime is not ready yet, try again in a moment.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_wait_hint() {
        let err = PipelineError::from(GenerationError::RateLimited {
            message: "slow down".into(),
        });
        let msg = err.user_message();
        assert!(msg.contains("slow down"));
        assert!(msg.contains("wait"));
    }

    #[test]
    fn other_generation_errors_have_no_hint() {
        let err = GenerationError::Http { status: 500, message: "boom".into() };
        assert!(err.retry_hint().is_none());
        assert_eq!(
            PipelineError::from(err).user_message(),
            "generation service returned 500: boom"
        );
    }

    #[test]
    fn timeout_message_mentions_seconds() {
        let err = PipelineError::ExecutionTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "code execution timed out after 30s");
    }
}
