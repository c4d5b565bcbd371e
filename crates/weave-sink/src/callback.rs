use crate::sink::{GraphSink, SinkResult};
use std::sync::Arc;
use weave_graph::GraphRecord;

pub type SinkCallback = Arc<dyn Fn(&str, &GraphRecord) -> SinkResult<()> + Send + Sync>;

/// Hands every flushed tree to a caller-supplied callback.
#[derive(Clone)]
pub struct CallbackGraphSink {
    callback: SinkCallback,
}

impl CallbackGraphSink {
    pub fn new(
        callback: impl Fn(&str, &GraphRecord) -> SinkResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }
}

#[async_trait::async_trait]
impl GraphSink for CallbackGraphSink {
    async fn flush(&self, session_id: &str, record: &GraphRecord) -> SinkResult<()> {
        (self.callback)(session_id, record)
    }
}
