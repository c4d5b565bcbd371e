use crate::errors::AgentError;
use crate::messages::MessageEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use weave_graph::{GraphRecord, InteractionNode};

/// Per-session state: the tree root plus, per agent name, the most recently
/// submitted message sequence for that (session, agent) pair.
#[derive(Default)]
pub(crate) struct SessionEntry {
    pub(crate) root: Option<InteractionNode>,
    pub(crate) submitted: HashMap<String, Vec<MessageEntry>>,
}

/// Map from session id to its tree and submission history. Cloning shares
/// the underlying state; the registry is owned by the caller, not a global.
/// Entries are created lazily on first reference and removed only by
/// [`SessionRegistry::clear`].
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the session root from `first_message`, which must be a plain
    /// message. Idempotent once a root exists.
    pub fn get_or_create_root(
        &self,
        session_id: &str,
        first_message: &MessageEntry,
        agent_name: &str,
    ) -> Result<(), AgentError> {
        self.with_session(session_id, |entry| {
            if entry.root.is_some() {
                return Ok(());
            }
            let MessageEntry::Message { role, content } = first_message else {
                return Err(AgentError::MalformedRoot {
                    session_id: session_id.to_string(),
                });
            };
            entry.root = Some(InteractionNode::message(
                session_id,
                (*role).into(),
                content,
                agent_name,
            ));
            Ok(())
        })
    }

    /// Drop the session's tree and submission history. No-op for unknown
    /// ids; never touches output already flushed to a sink.
    pub fn clear(&self, session_id: &str) {
        self.inner
            .lock()
            .expect("session registry mutex")
            .remove(session_id);
    }

    /// Current tree as a persisted record, if the session has one.
    pub fn snapshot(&self, session_id: &str) -> Option<GraphRecord> {
        self.inner
            .lock()
            .expect("session registry mutex")
            .get(session_id)
            .and_then(|entry| entry.root.as_ref().map(GraphRecord::from))
    }

    /// Run `f` against the session entry under the registry lock. All tree
    /// mutation goes through here, which serializes child-list updates from
    /// concurrently resolving sub-runs.
    pub(crate) fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionEntry) -> R,
    ) -> R {
        let mut sessions = self.inner.lock().expect("session registry mutex");
        let entry = sessions.entry(session_id.to_string()).or_default();
        f(entry)
    }
}
