use weave_graph::GraphRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("write failed: {0}")]
    Io(String),

    #[error("callback failed: {0}")]
    Callback(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Receives a session's full tree after every mutation. Callers swallow
/// flush failures; a sink must never be able to abort a run.
#[async_trait::async_trait]
pub trait GraphSink: Send + Sync {
    async fn flush(&self, session_id: &str, record: &GraphRecord) -> SinkResult<()>;
}
