//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Every variant is fatal to the run it occurs in. Recoverable conditions
/// (unknown tools, malformed evidence ids, handled tool failures) never reach
/// this type; they are folded into observation strings by the dispatcher.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// LLM output carried both a final answer and an action
    #[error("Parsing LLM output produced both a final answer and a parse-able action: {0}")]
    AmbiguousOutput(String),

    /// LLM output matched no grammar (strict decoding only)
    #[error("Could not parse LLM output: `{0}`")]
    UnparsableOutput(String),

    /// Planner output violated the plan grammar
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    /// Evidence references form a cycle
    #[error("Circular dependency detected among {}", .remaining.join(", "))]
    CircularDependency { remaining: Vec<String> },

    /// Tool failed and its error policy re-raises
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Prompt template could not be populated
    #[error("Template error: {0}")]
    Template(String),

    /// An LLM call or the whole run exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The run was cancelled by its caller
    #[error("Run cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool or provider panicked mid-run
    #[error("Run panicked: {0}")]
    Panicked(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Whether the error came from decoding LLM text rather than from I/O
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            AgentError::AmbiguousOutput(_)
                | AgentError::UnparsableOutput(_)
                | AgentError::MalformedPlan(_)
                | AgentError::CircularDependency { .. }
        )
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

/// Error raised by a tool while running.
///
/// What happens next is decided by the tool's
/// [`ToolErrorPolicy`](crate::tool::ToolErrorPolicy): the run either fails or
/// continues with an observation built from this exception.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or("Tool execution error"))]
pub struct ToolException {
    /// First argument of the exception, if any
    pub message: Option<String>,
}

impl ToolException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Exception without an argument
    pub fn bare() -> Self {
        Self { message: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_ids() {
        let err = AgentError::CircularDependency {
            remaining: vec!["#E1".into(), "#E2".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected among #E1, #E2");
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_tool_exception_display() {
        assert_eq!(ToolException::new("boom").to_string(), "boom");
        assert_eq!(ToolException::bare().to_string(), "Tool execution error");
    }

    #[test]
    fn test_from_anyhow() {
        let err: AgentError = anyhow::anyhow!("upstream failed").into();
        assert!(matches!(err, AgentError::Other(ref m) if m == "upstream failed"));
    }
}
