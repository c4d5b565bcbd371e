use crate::errors::AgentError;
use crate::messages::{MessageEntry, MessageRole, SequenceFit, sequence_fit, visible_messages};
use crate::model::{FunctionCall, ModelInvoker, ModelResponse};
use crate::registry::SessionRegistry;
use crate::tools::{ToolCallContext, ToolDescriptor, ToolError, ToolSet};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use weave_graph::{GraphError, GraphRecord, InteractionNode, ToolCallMeta, navigator};
use weave_sink::GraphSink;

/// Iteration cap for the model/tool loop when the caller does not set one.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Everything one agent turn needs: identity, placement, the full message
/// sequence to submit, and the tools the model may call.
#[derive(Clone)]
pub struct RunRequest {
    pub agent_name: String,
    pub session_id: String,
    /// Attach beneath this `function_call` node instead of the session root.
    pub parent_tool_call_id: Option<String>,
    pub messages: Vec<MessageEntry>,
    pub tools: ToolSet,
    pub max_iterations: usize,
}

impl RunRequest {
    pub fn new(
        agent_name: impl Into<String>,
        session_id: impl Into<String>,
        messages: Vec<MessageEntry>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            session_id: session_id.into(),
            parent_tool_call_id: None,
            messages,
            tools: ToolSet::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_parent_tool_call(mut self, call_id: impl Into<String>) -> Self {
        self.parent_tool_call_id = Some(call_id.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Drives agent turns against a shared registry, recording every message and
/// tool call into the session tree and flushing the tree to the sink after
/// each insertion. Cloning shares the registry and sink, so sub-runs spawned
/// from tool executors land in the same trees.
#[derive(Clone)]
pub struct RunCoordinator {
    registry: SessionRegistry,
    sink: Arc<dyn GraphSink>,
}

impl RunCoordinator {
    pub fn new(registry: SessionRegistry, sink: Arc<dyn GraphSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run one agent turn: record the submitted messages, then loop invoking
    /// the model and executing requested tools until the model answers with
    /// plain text. Returns that final response.
    pub async fn run_agent_turn(
        &self,
        request: RunRequest,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Result<ModelResponse, AgentError> {
        let RunRequest {
            agent_name: requested_name,
            session_id,
            parent_tool_call_id,
            mut messages,
            tools,
            max_iterations,
        } = request;

        let agent_name = self.claim_agent_name(&session_id, &requested_name, &messages)?;
        tracing::debug!(
            session = %session_id,
            agent = %agent_name,
            "starting agent turn"
        );

        let visible = visible_messages(&messages);
        let (local_root_id, snapshots) = self.registry.with_session(&session_id, |entry| {
            Self::attach(
                entry,
                &session_id,
                &agent_name,
                parent_tool_call_id.as_deref(),
                &visible,
            )
        })?;
        for record in &snapshots {
            self.flush_record(&session_id, record).await;
        }

        for iteration in 1..=max_iterations {
            let response = invoker.invoke(&messages).await?;
            let calls: Vec<FunctionCall> =
                response.function_calls().into_iter().cloned().collect();

            if calls.is_empty() {
                self.append_message(
                    &session_id,
                    &agent_name,
                    &local_root_id,
                    MessageRole::Assistant,
                    response.output_text.clone(),
                )
                .await?;
                tracing::debug!(
                    session = %session_id,
                    agent = %agent_name,
                    iteration,
                    "agent turn completed"
                );
                return Ok(response);
            }

            for call in &calls {
                self.append_call_node(
                    &session_id,
                    &agent_name,
                    &local_root_id,
                    call,
                    iteration as u32,
                )
                .await?;
                messages.push(MessageEntry::FunctionCall {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
            }

            let mut joined: Vec<(
                FunctionCall,
                ToolDescriptor,
                JoinHandle<Result<String, ToolError>>,
            )> = Vec::new();
            for call in &calls {
                let descriptor = tools
                    .get(&call.name)
                    .ok_or_else(|| AgentError::UnknownTool {
                        name: call.name.clone(),
                    })?
                    .clone();
                let context = ToolCallContext {
                    name: &call.name,
                    arguments: &call.arguments,
                    call_id: &call.call_id,
                    siblings: &calls,
                };
                if descriptor.may_run_parallel(&context) {
                    let handle = tokio::spawn(execute_tool(descriptor.clone(), call.clone()));
                    joined.push((call.clone(), descriptor, handle));
                } else {
                    let outcome = execute_tool(descriptor.clone(), call.clone()).await;
                    let output = self
                        .settle_call(&session_id, &descriptor, call, outcome)
                        .await?;
                    messages.push(MessageEntry::FunctionCallOutput {
                        call_id: call.call_id.clone(),
                        output,
                    });
                }
            }
            let settled = futures::future::join_all(joined.into_iter().map(
                |(call, descriptor, handle)| async move { (call, descriptor, handle.await) },
            ))
            .await;
            for (call, descriptor, joined_outcome) in settled {
                let outcome = joined_outcome
                    .map_err(|err| AgentError::TaskJoin(err.to_string()))?;
                let output = self
                    .settle_call(&session_id, &descriptor, &call, outcome)
                    .await?;
                messages.push(MessageEntry::FunctionCallOutput {
                    call_id: call.call_id,
                    output,
                });
            }
        }

        Err(AgentError::IterationsExhausted {
            limit: max_iterations,
        })
    }

    /// Pick the name this run records under. The requested name is kept when
    /// unused or when the incoming sequence strictly extends the one last
    /// submitted under it; otherwise numbered variants are probed in order.
    fn claim_agent_name(
        &self,
        session_id: &str,
        requested: &str,
        messages: &[MessageEntry],
    ) -> Result<String, AgentError> {
        self.registry.with_session(session_id, |entry| {
            let mut candidate = requested.to_string();
            let mut collisions = 0usize;
            loop {
                let fit = match entry.submitted.get(&candidate) {
                    None => SequenceFit::Extends,
                    Some(stored) => sequence_fit(stored, messages)?,
                };
                match fit {
                    SequenceFit::Extends => {
                        entry.submitted.insert(candidate.clone(), messages.to_vec());
                        return Ok(candidate);
                    }
                    SequenceFit::Diverges => {
                        collisions += 1;
                        candidate = format!("{requested} ({collisions})");
                    }
                }
            }
        })
    }

    /// Resolve the run's local root and append the visible messages beneath
    /// its open tip, all under one registry lock so concurrent runs cannot
    /// interleave between planning and appending. Returns the local root id
    /// plus one tree snapshot per insertion, oldest first. Later appends must
    /// re-resolve the tip from the local root: another run sharing the
    /// session may have extended the thread across an await.
    fn attach(
        entry: &mut crate::registry::SessionEntry,
        session_id: &str,
        agent_name: &str,
        parent_tool_call_id: Option<&str>,
        visible: &[(MessageRole, String)],
    ) -> Result<(String, Vec<GraphRecord>), AgentError> {
        let mut snapshots = Vec::new();

        let local_root_id = match parent_tool_call_id {
            None => match entry.root.as_ref() {
                Some(root) => root.id.clone(),
                None => {
                    let (role, content) =
                        visible
                            .first()
                            .cloned()
                            .ok_or_else(|| AgentError::MalformedRoot {
                                session_id: session_id.to_string(),
                            })?;
                    let node = InteractionNode::message(session_id, role.into(), content, agent_name);
                    let id = node.id.clone();
                    let root = entry.root.insert(node);
                    snapshots.push(GraphRecord::from(&*root));
                    id
                }
            },
            Some(call_id) => {
                let root = entry
                    .root
                    .as_mut()
                    .ok_or_else(|| GraphError::ToolCallNotFound {
                        call_id: call_id.to_string(),
                    })?;
                let call_node_id = navigator::locate_tool_call(root, call_id)
                    .map(|node| node.id.clone())
                    .ok_or_else(|| GraphError::ToolCallNotFound {
                        call_id: call_id.to_string(),
                    })?;
                let call_node =
                    root.find_mut(&call_node_id)
                        .ok_or_else(|| GraphError::NodeNotFound {
                            node_id: call_node_id.clone(),
                        })?;
                // A call node with pending sibling calls can still hold the
                // sub-flow's single continuation child; reuse it either way.
                match call_node.continuation() {
                    Some(child) => child.id.clone(),
                    None => {
                        let (role, content) =
                            visible
                                .first()
                                .cloned()
                                .ok_or_else(|| AgentError::MalformedRoot {
                                    session_id: session_id.to_string(),
                                })?;
                        let child =
                            InteractionNode::message(session_id, role.into(), content, agent_name);
                        let id = child.id.clone();
                        call_node.push_continuation(child)?;
                        snapshots.push(GraphRecord::from(&*root));
                        id
                    }
                }
            }
        };

        let root = entry
            .root
            .as_ref()
            .ok_or_else(|| AgentError::SessionRootMissing {
                session_id: session_id.to_string(),
            })?;
        let local_root = root
            .find(&local_root_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: local_root_id.clone(),
            })?;
        let tip = navigator::open_thread_tip(local_root);
        let (mut tip_id, start) = if tip.agent_name == agent_name {
            let overlap = navigator::matching_agent_run_length(agent_name, local_root);
            let offset = overlap.run_len;
            let aligned = offset > 0
                && offset <= visible.len()
                && tip.value == visible[offset - 1].1;
            if !aligned {
                return Err(AgentError::ResumeMismatch {
                    agent: agent_name.to_string(),
                });
            }
            (tip.id.clone(), offset)
        } else {
            (tip.id.clone(), 0)
        };

        let root = entry
            .root
            .as_mut()
            .ok_or_else(|| AgentError::SessionRootMissing {
                session_id: session_id.to_string(),
            })?;
        for (role, content) in visible[start..].iter() {
            let node = InteractionNode::message(session_id, (*role).into(), content.clone(), agent_name);
            let next_id = node.id.clone();
            root.find_mut(&tip_id)
                .ok_or_else(|| GraphError::NodeNotFound {
                    node_id: tip_id.clone(),
                })?
                .push_continuation(node)?;
            tip_id = next_id;
            snapshots.push(GraphRecord::from(&*root));
        }
        Ok((local_root_id, snapshots))
    }

    /// The open-thread tip beneath the run's local root, looked up fresh so
    /// thread growth from concurrent runs moves the attachment point instead
    /// of invalidating it.
    fn current_tip_id(
        root: &InteractionNode,
        local_root_id: &str,
    ) -> Result<String, AgentError> {
        let local_root = root
            .find(local_root_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: local_root_id.to_string(),
            })?;
        Ok(navigator::open_thread_tip(local_root).id.clone())
    }

    /// Mutate the session tree under the registry lock, then flush the
    /// resulting snapshot once.
    async fn mutate<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut InteractionNode) -> Result<R, AgentError>,
    ) -> Result<R, AgentError> {
        let (result, record) = self.registry.with_session(session_id, |entry| {
            let root = entry
                .root
                .as_mut()
                .ok_or_else(|| AgentError::SessionRootMissing {
                    session_id: session_id.to_string(),
                })?;
            let result = f(root)?;
            Ok::<_, AgentError>((result, GraphRecord::from(&*root)))
        })?;
        self.flush_record(session_id, &record).await;
        Ok(result)
    }

    async fn append_message(
        &self,
        session_id: &str,
        agent_name: &str,
        local_root_id: &str,
        role: MessageRole,
        content: String,
    ) -> Result<String, AgentError> {
        self.mutate(session_id, |root| {
            let anchor_id = Self::current_tip_id(root, local_root_id)?;
            let node = InteractionNode::message(session_id, role.into(), content, agent_name);
            let id = node.id.clone();
            root.find_mut(&anchor_id)
                .ok_or_else(|| GraphError::NodeNotFound {
                    node_id: anchor_id.clone(),
                })?
                .push_continuation(node)?;
            Ok(id)
        })
        .await
    }

    async fn append_call_node(
        &self,
        session_id: &str,
        agent_name: &str,
        local_root_id: &str,
        call: &FunctionCall,
        iteration: u32,
    ) -> Result<(), AgentError> {
        self.mutate(session_id, |root| {
            let anchor_id = Self::current_tip_id(root, local_root_id)?;
            let node = InteractionNode::tool_call(
                session_id,
                &call.call_id,
                agent_name,
                ToolCallMeta {
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: None,
                    iteration,
                },
            );
            root.find_mut(&anchor_id)
                .ok_or_else(|| GraphError::NodeNotFound {
                    node_id: anchor_id.clone(),
                })?
                .push_tool_call(node)?;
            Ok(())
        })
        .await
    }

    /// Turn a tool outcome into the output string recorded on the call node
    /// and fed back to the model. A failure is recoverable only when the
    /// descriptor carries an error converter.
    async fn settle_call(
        &self,
        session_id: &str,
        descriptor: &ToolDescriptor,
        call: &FunctionCall,
        outcome: Result<String, ToolError>,
    ) -> Result<String, AgentError> {
        let output = match outcome {
            Ok(output) => output,
            Err(error) => match &descriptor.error_converter {
                Some(convert) => convert(&error),
                None => return Err(error.into()),
            },
        };
        self.mutate(session_id, |root| {
            root.record_tool_result(&call.call_id, &output)
                .map_err(AgentError::from)
        })
        .await?;
        Ok(output)
    }

    /// Persistence failures never abort a run; the in-memory tree is the
    /// source of truth and later flushes rewrite the whole document.
    async fn flush_record(&self, session_id: &str, record: &GraphRecord) {
        if let Err(error) = self.sink.flush(session_id, record).await {
            tracing::warn!(
                session = %session_id,
                %error,
                "graph flush failed; run continues"
            );
        }
    }
}

fn execute_tool(
    descriptor: ToolDescriptor,
    call: FunctionCall,
) -> impl Future<Output = Result<String, ToolError>> + Send + 'static {
    async move {
        let arguments = parse_call_arguments(&call)?;
        (descriptor.executor)(arguments, call.call_id.clone()).await
    }
}

fn parse_call_arguments(call: &FunctionCall) -> Result<Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(&call.arguments).map_err(|err| {
        ToolError::new(format!(
            "invalid JSON arguments for tool '{}': {}",
            call.name, err
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_graph::NodeRole;
    use weave_sink::MemoryGraphSink;

    fn coordinator() -> RunCoordinator {
        RunCoordinator::new(SessionRegistry::new(), Arc::new(MemoryGraphSink::new()))
    }

    fn opening() -> Vec<MessageEntry> {
        vec![MessageEntry::system("prompt"), MessageEntry::user("hello")]
    }

    #[test]
    fn claim_agent_name_numbers_diverging_resubmissions() {
        let coordinator = coordinator();
        let first = coordinator
            .claim_agent_name("s1", "main", &opening())
            .expect("first claim");
        assert_eq!(first, "main");

        let diverging = vec![MessageEntry::system("prompt"), MessageEntry::user("other")];
        let second = coordinator
            .claim_agent_name("s1", "main", &diverging)
            .expect("second claim");
        assert_eq!(second, "main (1)");

        let third = coordinator
            .claim_agent_name("s1", "main", &opening())
            .expect("third claim");
        assert_eq!(third, "main (2)");
    }

    #[test]
    fn claim_agent_name_keeps_name_for_extension() {
        let coordinator = coordinator();
        coordinator
            .claim_agent_name("s1", "main", &opening())
            .expect("first claim");

        let mut extended = opening();
        extended.push(MessageEntry::assistant("hi"));
        extended.push(MessageEntry::user("more"));
        let name = coordinator
            .claim_agent_name("s1", "main", &extended)
            .expect("extension claim");
        assert_eq!(name, "main");
    }

    #[test]
    fn attach_empty_visible_without_root_expected_malformed() {
        let coordinator = coordinator();
        let error = coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "main", None, &[])
            })
            .expect_err("no root and nothing to seed it with");
        assert!(matches!(error, AgentError::MalformedRoot { .. }));
    }

    #[test]
    fn attach_unknown_parent_call_expected_not_found() {
        let coordinator = coordinator();
        let visible = vec![(MessageRole::System, "sub prompt".to_string())];
        let error = coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "sub", Some("missing"), &visible)
            })
            .expect_err("no tree, so no call node");
        assert!(matches!(
            error,
            AgentError::Graph(GraphError::ToolCallNotFound { .. })
        ));
    }

    #[test]
    fn attach_reuses_continuation_of_call_node_with_pending_siblings() {
        let coordinator = coordinator();
        let meta = |name: &str| ToolCallMeta {
            tool_name: name.to_string(),
            arguments: "{}".to_string(),
            result: None,
            iteration: 1,
        };
        coordinator.registry.with_session("s1", |entry| {
            let mut root = InteractionNode::message("s1", NodeRole::User, "hello", "main");
            let mut call_node = InteractionNode::tool_call("s1", "c1", "main", meta("delegate"));
            call_node
                .push_continuation(InteractionNode::message(
                    "s1",
                    NodeRole::System,
                    "sub prompt",
                    "sub",
                ))
                .expect("sub-flow root attaches");
            call_node
                .push_tool_call(InteractionNode::tool_call("s1", "c2", "sub", meta("grep")))
                .expect("nested call attaches");
            root.push_tool_call(call_node).expect("call attaches");
            entry.root = Some(root);
        });

        // The call node fans out into a nested call, but its single
        // continuation child is still the sub-flow to continue.
        let visible = vec![
            (MessageRole::System, "sub prompt".to_string()),
            (MessageRole::User, "task".to_string()),
        ];
        let (_, snapshots) = coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "sub", Some("c1"), &visible)
            })
            .expect("continuation child is reused");
        assert_eq!(snapshots.len(), 1);

        let record = coordinator.registry.snapshot("s1").expect("tree exists");
        let call_node = record
            .pointing_to_node
            .iter()
            .find(|child| child.value == "c1")
            .expect("call node recorded");
        let sub_root = call_node
            .pointing_to_node
            .iter()
            .find(|child| child.role != NodeRole::FunctionCall)
            .expect("sub-flow root kept");
        assert_eq!(sub_root.value, "sub prompt");
        assert_eq!(sub_root.pointing_to_node[0].value, "task");
    }

    #[test]
    fn attach_resume_with_wrong_tail_expected_mismatch() {
        let coordinator = coordinator();
        let visible = vec![
            (MessageRole::System, "prompt".to_string()),
            (MessageRole::User, "hello".to_string()),
        ];
        coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "main", None, &visible)
            })
            .expect("first attach");

        // Same agent, but the recorded tip is "hello" and the resubmission
        // claims the thread ended elsewhere.
        let stale = vec![
            (MessageRole::System, "prompt".to_string()),
            (MessageRole::User, "edited".to_string()),
            (MessageRole::User, "next".to_string()),
        ];
        let error = coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "main", None, &stale)
            })
            .expect_err("tail does not line up");
        assert!(matches!(error, AgentError::ResumeMismatch { .. }));
    }

    #[test]
    fn attach_extension_appends_only_new_messages() {
        let coordinator = coordinator();
        let visible = vec![
            (MessageRole::System, "prompt".to_string()),
            (MessageRole::User, "hello".to_string()),
        ];
        coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "main", None, &visible)
            })
            .expect("first attach");

        let extended = vec![
            (MessageRole::System, "prompt".to_string()),
            (MessageRole::User, "hello".to_string()),
            (MessageRole::Assistant, "hi".to_string()),
            (MessageRole::User, "more".to_string()),
        ];
        let (_, snapshots) = coordinator
            .registry
            .with_session("s1", |entry| {
                RunCoordinator::attach(entry, "s1", "main", None, &extended)
            })
            .expect("extension attach");
        // One snapshot per inserted node.
        assert_eq!(snapshots.len(), 2);

        let record = coordinator.registry.snapshot("s1").expect("tree exists");
        let mut depth = 0;
        let mut cursor = Some(&record);
        while let Some(node) = cursor {
            depth += 1;
            cursor = node.pointing_to_node.first();
        }
        assert_eq!(depth, 4);
    }

    #[test]
    fn parse_call_arguments_empty_string_expected_empty_object() {
        let call = FunctionCall {
            call_id: "c1".to_string(),
            name: "grep".to_string(),
            arguments: "  ".to_string(),
        };
        let value = parse_call_arguments(&call).expect("empty arguments parse");
        assert_eq!(value, Value::Object(serde_json::Map::new()));
    }

    #[test]
    fn parse_call_arguments_invalid_json_expected_error() {
        let call = FunctionCall {
            call_id: "c1".to_string(),
            name: "grep".to_string(),
            arguments: "{not json".to_string(),
        };
        let error = parse_call_arguments(&call).expect_err("broken arguments");
        assert!(error.message.contains("grep"));
    }
}
