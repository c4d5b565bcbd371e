use crate::sink::{GraphSink, SinkError, SinkResult};
use std::fs;
use std::path::{Path, PathBuf};
use weave_graph::GraphRecord;

/// Writes each session's tree to `<root>/<session-id>.json` on every flush.
#[derive(Clone, Debug)]
pub struct FsGraphSink {
    root: PathBuf,
}

impl FsGraphSink {
    pub fn new<P: AsRef<Path>>(root: P) -> SinkResult<Self> {
        fs::create_dir_all(root.as_ref())
            .map_err(|err| SinkError::Io(format!("create sink root failed: {err}")))?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn document_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }
}

#[async_trait::async_trait]
impl GraphSink for FsGraphSink {
    async fn flush(&self, session_id: &str, record: &GraphRecord) -> SinkResult<()> {
        let raw = serde_json::to_vec_pretty(record)
            .map_err(|err| SinkError::Serialization(err.to_string()))?;
        let target = self.document_path(session_id);
        let tmp = target.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .map_err(|err| SinkError::Io(format!("write graph document failed: {err}")))?;
        fs::rename(&tmp, &target)
            .map_err(|err| SinkError::Io(format!("rename graph document failed: {err}")))?;
        Ok(())
    }
}
