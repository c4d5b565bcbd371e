use thiserror::Error;

/// Structural errors raised by graph construction and traversal.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("multiple open branches below node {node_id}")]
    MultipleOpenBranches { node_id: String },

    #[error("tool call node not found: {call_id}")]
    ToolCallNotFound { call_id: String },

    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("node {node_id} already has a continuation child")]
    ContinuationOccupied { node_id: String },

    #[error("invalid graph record: {0}")]
    InvalidRecord(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
