use crate::sink::{GraphSink, SinkResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use weave_graph::GraphRecord;

#[derive(Clone, Debug, Default)]
struct MemoryEntry {
    latest: Option<GraphRecord>,
    flush_count: u64,
}

/// Retains the latest flushed tree and a flush counter per session.
/// Intended for tests and in-process inspection.
#[derive(Clone, Default)]
pub struct MemoryGraphSink {
    inner: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryGraphSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, session_id: &str) -> Option<GraphRecord> {
        self.inner
            .lock()
            .expect("memory sink mutex")
            .get(session_id)
            .and_then(|entry| entry.latest.clone())
    }

    pub fn flush_count(&self, session_id: &str) -> u64 {
        self.inner
            .lock()
            .expect("memory sink mutex")
            .get(session_id)
            .map(|entry| entry.flush_count)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl GraphSink for MemoryGraphSink {
    async fn flush(&self, session_id: &str, record: &GraphRecord) -> SinkResult<()> {
        let mut inner = self.inner.lock().expect("memory sink mutex");
        let entry = inner.entry(session_id.to_string()).or_default();
        entry.latest = Some(record.clone());
        entry.flush_count += 1;
        Ok(())
    }
}
