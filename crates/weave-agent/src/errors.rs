use crate::model::ModelError;
use crate::tools::ToolError;
use thiserror::Error;
use weave_graph::GraphError;

/// Top-level error type for the weave-agent crate. Every variant is fatal
/// to the run that raised it; nodes already flushed are retained.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("unknown function call: {name}")]
    UnknownTool { name: String },

    #[error("session '{session_id}' needs a plain initial message to seed its root")]
    MalformedRoot { session_id: String },

    #[error("session '{session_id}' has no recorded tree")]
    SessionRootMissing { session_id: String },

    #[error("message sequences diverge in kind at index {index}")]
    SequenceKindMismatch { index: usize },

    #[error(
        "resuming run for '{agent}' does not line up with the recorded thread; \
         did you forget to append the previous turn's reply?"
    )]
    ResumeMismatch { agent: String },

    #[error("exhausted {limit} iterations with tool calls still pending")]
    IterationsExhausted { limit: usize },

    #[error("tool task failed: {0}")]
    TaskJoin(String),
}
