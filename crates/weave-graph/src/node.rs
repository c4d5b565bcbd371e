use crate::errors::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of one recorded node. `FunctionCall` nodes carry the tool call id in
/// their `value` field and open a sub-flow beneath themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    System,
    User,
    Assistant,
    Developer,
    FunctionCall,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Developer => "developer",
            Self::FunctionCall => "function_call",
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Self::FunctionCall)
    }
}

/// Tool metadata attached to a `function_call` node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallMeta {
    pub tool_name: String,
    /// Raw argument string exactly as the model issued it.
    pub arguments: String,
    pub result: Option<String>,
    /// Iteration of the model/tool loop that issued the call, 1-based.
    pub iteration: u32,
}

/// Children of a node, encoded so that the one-open-branch rule is
/// structural: a node either chains into a single continuation, or fans out
/// into tool calls with at most one continuation once results exist.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum NodeChildren {
    #[default]
    Leaf,
    Continuation(Box<InteractionNode>),
    ToolCalls {
        calls: Vec<InteractionNode>,
        continuation: Option<Box<InteractionNode>>,
    },
}

/// One recorded message or tool-call unit in a session's tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionNode {
    pub id: String,
    pub session_id: String,
    pub role: NodeRole,
    /// Message content, or the tool call id for `function_call` nodes.
    pub value: String,
    /// Agent name that authored the node.
    pub agent_name: String,
    pub tool_call: Option<ToolCallMeta>,
    pub children: NodeChildren,
}

impl InteractionNode {
    /// A plain message node.
    pub fn message(
        session_id: impl Into<String>,
        role: NodeRole,
        value: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            value: value.into(),
            agent_name: agent_name.into(),
            tool_call: None,
            children: NodeChildren::Leaf,
        }
    }

    /// A `function_call` node; `call_id` becomes the node value.
    pub fn tool_call(
        session_id: impl Into<String>,
        call_id: impl Into<String>,
        agent_name: impl Into<String>,
        meta: ToolCallMeta,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role: NodeRole::FunctionCall,
            value: call_id.into(),
            agent_name: agent_name.into(),
            tool_call: Some(meta),
            children: NodeChildren::Leaf,
        }
    }

    /// All children, tool calls before the continuation.
    pub fn child_nodes(&self) -> impl Iterator<Item = &InteractionNode> {
        let (calls, continuation): (&[InteractionNode], Option<&InteractionNode>) =
            match &self.children {
                NodeChildren::Leaf => (&[], None),
                NodeChildren::Continuation(next) => (&[], Some(next)),
                NodeChildren::ToolCalls {
                    calls,
                    continuation,
                } => (calls.as_slice(), continuation.as_deref()),
            };
        calls.iter().chain(continuation)
    }

    /// The single non-function-call child, when present.
    pub fn continuation(&self) -> Option<&InteractionNode> {
        match &self.children {
            NodeChildren::Leaf => None,
            NodeChildren::Continuation(next) => Some(next),
            NodeChildren::ToolCalls { continuation, .. } => continuation.as_deref(),
        }
    }

    /// Function-call children issued beneath this node.
    pub fn call_children(&self) -> &[InteractionNode] {
        match &self.children {
            NodeChildren::ToolCalls { calls, .. } => calls.as_slice(),
            _ => &[],
        }
    }

    /// Depth-first lookup by node id.
    pub fn find(&self, node_id: &str) -> Option<&InteractionNode> {
        if self.id == node_id {
            return Some(self);
        }
        for child in self.child_nodes() {
            if let Some(found) = child.find(node_id) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first mutable lookup by node id.
    pub fn find_mut(&mut self, node_id: &str) -> Option<&mut InteractionNode> {
        if self.id == node_id {
            return Some(self);
        }
        match &mut self.children {
            NodeChildren::Leaf => None,
            NodeChildren::Continuation(next) => next.find_mut(node_id),
            NodeChildren::ToolCalls {
                calls,
                continuation,
            } => {
                for call in calls.iter_mut() {
                    if let Some(found) = call.find_mut(node_id) {
                        return Some(found);
                    }
                }
                continuation
                    .as_deref_mut()
                    .and_then(|next| next.find_mut(node_id))
            }
        }
    }

    /// Attach `node` as this node's continuation child.
    pub fn push_continuation(&mut self, node: InteractionNode) -> GraphResult<()> {
        if node.role.is_function_call() {
            return Err(GraphError::InvalidRecord(
                "a continuation child must not be a function_call node".to_string(),
            ));
        }
        match &mut self.children {
            NodeChildren::Leaf => {
                self.children = NodeChildren::Continuation(Box::new(node));
                Ok(())
            }
            NodeChildren::Continuation(_) => Err(GraphError::ContinuationOccupied {
                node_id: self.id.clone(),
            }),
            NodeChildren::ToolCalls { continuation, .. } => {
                if continuation.is_some() {
                    return Err(GraphError::ContinuationOccupied {
                        node_id: self.id.clone(),
                    });
                }
                *continuation = Some(Box::new(node));
                Ok(())
            }
        }
    }

    /// Attach `node` as one of this node's tool-call children.
    pub fn push_tool_call(&mut self, node: InteractionNode) -> GraphResult<()> {
        if !node.role.is_function_call() {
            return Err(GraphError::InvalidRecord(
                "a tool-call child must be a function_call node".to_string(),
            ));
        }
        match std::mem::take(&mut self.children) {
            NodeChildren::Leaf => {
                self.children = NodeChildren::ToolCalls {
                    calls: vec![node],
                    continuation: None,
                };
            }
            NodeChildren::Continuation(next) => {
                self.children = NodeChildren::ToolCalls {
                    calls: vec![node],
                    continuation: Some(next),
                };
            }
            NodeChildren::ToolCalls {
                mut calls,
                continuation,
            } => {
                calls.push(node);
                self.children = NodeChildren::ToolCalls {
                    calls,
                    continuation,
                };
            }
        }
        Ok(())
    }

    /// Record a tool result on the `function_call` node holding `call_id`.
    pub fn record_tool_result(&mut self, call_id: &str, result: &str) -> GraphResult<()> {
        let Some(node) = self.tool_call_node_mut(call_id) else {
            return Err(GraphError::ToolCallNotFound {
                call_id: call_id.to_string(),
            });
        };
        let Some(meta) = node.tool_call.as_mut() else {
            return Err(GraphError::InvalidRecord(format!(
                "function_call node {} has no tool metadata",
                node.id
            )));
        };
        meta.result = Some(result.to_string());
        Ok(())
    }

    fn tool_call_node_mut(&mut self, call_id: &str) -> Option<&mut InteractionNode> {
        if self.role.is_function_call() && self.value == call_id {
            return Some(self);
        }
        match &mut self.children {
            NodeChildren::Leaf => None,
            NodeChildren::Continuation(next) => next.tool_call_node_mut(call_id),
            NodeChildren::ToolCalls {
                calls,
                continuation,
            } => {
                for call in calls.iter_mut() {
                    if let Some(found) = call.tool_call_node_mut(call_id) {
                        return Some(found);
                    }
                }
                continuation
                    .as_deref_mut()
                    .and_then(|next| next.tool_call_node_mut(call_id))
            }
        }
    }
}
