use crate::errors::GraphError;
use crate::node::{InteractionNode, NodeChildren, NodeRole, ToolCallMeta};
use serde::{Deserialize, Serialize};

/// Persisted form of a node tree. Field names match what the graph
/// visualizer reads, so a flushed document renders without translation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecord {
    pub node_id: String,
    pub session_id: String,
    pub role: NodeRole,
    pub value: String,
    /// Agent name that authored the node.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pointing_to_node: Vec<GraphRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_iteration: Option<u32>,
}

impl From<&InteractionNode> for GraphRecord {
    fn from(node: &InteractionNode) -> Self {
        let meta = node.tool_call.as_ref();
        Self {
            node_id: node.id.clone(),
            session_id: node.session_id.clone(),
            role: node.role,
            value: node.value.clone(),
            name: node.agent_name.clone(),
            pointing_to_node: node.child_nodes().map(GraphRecord::from).collect(),
            tool_name: meta.map(|meta| meta.tool_name.clone()),
            tool_args: meta.map(|meta| meta.arguments.clone()),
            tool_result: meta.and_then(|meta| meta.result.clone()),
            tool_call_iteration: meta.map(|meta| meta.iteration),
        }
    }
}

impl TryFrom<GraphRecord> for InteractionNode {
    type Error = GraphError;

    /// Rebuild the in-memory tree from a persisted record, validating the
    /// one-open-branch invariant that the record format cannot enforce.
    fn try_from(record: GraphRecord) -> Result<Self, Self::Error> {
        let tool_call = if record.role.is_function_call() {
            Some(ToolCallMeta {
                tool_name: record.tool_name.unwrap_or_default(),
                arguments: record.tool_args.unwrap_or_default(),
                result: record.tool_result,
                iteration: record.tool_call_iteration.unwrap_or(1),
            })
        } else {
            None
        };

        let mut calls = Vec::new();
        let mut continuations = Vec::new();
        for child in record.pointing_to_node {
            let child = InteractionNode::try_from(child)?;
            if child.role.is_function_call() {
                calls.push(child);
            } else {
                continuations.push(child);
            }
        }
        if continuations.len() > 1 {
            return Err(GraphError::MultipleOpenBranches {
                node_id: record.node_id,
            });
        }
        let continuation = continuations.pop().map(Box::new);
        let children = match (calls.is_empty(), continuation) {
            (true, None) => NodeChildren::Leaf,
            (true, Some(next)) => NodeChildren::Continuation(next),
            (false, continuation) => NodeChildren::ToolCalls {
                calls,
                continuation,
            },
        };

        Ok(Self {
            id: record.node_id,
            session_id: record.session_id,
            role: record.role,
            value: record.value,
            agent_name: record.name,
            tool_call,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> InteractionNode {
        let mut root = InteractionNode::message("s1", NodeRole::System, "prompt", "main");
        let mut user = InteractionNode::message("s1", NodeRole::User, "hello", "main");
        user.push_tool_call(InteractionNode::tool_call(
            "s1",
            "call-9",
            "main",
            ToolCallMeta {
                tool_name: "search".to_string(),
                arguments: "{\"q\":\"x\"}".to_string(),
                result: Some("hit".to_string()),
                iteration: 2,
            },
        ))
        .expect("tool call should attach");
        user.push_continuation(InteractionNode::message(
            "s1",
            NodeRole::Assistant,
            "answer",
            "main",
        ))
        .expect("continuation should attach");
        root.push_continuation(user)
            .expect("continuation should attach");
        root
    }

    #[test]
    fn record_serializes_visualizer_field_names() {
        let record = GraphRecord::from(&sample_tree());
        let json = serde_json::to_value(&record).expect("record should serialize");

        assert!(json.get("nodeId").is_some());
        assert!(json.get("sessionId").is_some());
        let user = &json["pointingToNode"][0];
        let call = &user["pointingToNode"][0];
        assert_eq!(call["role"], "function_call");
        assert_eq!(call["value"], "call-9");
        assert_eq!(call["toolName"], "search");
        assert_eq!(call["toolResult"], "hit");
        assert_eq!(call["toolCallIteration"], 2);
        assert_eq!(user["pointingToNode"][1]["role"], "assistant");
    }

    #[test]
    fn record_round_trip_expected_lossless() {
        let tree = sample_tree();
        let record = GraphRecord::from(&tree);
        let rebuilt = InteractionNode::try_from(record).expect("record should validate");
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn record_with_two_continuation_children_expected_violation() {
        let mut record = GraphRecord::from(&sample_tree());
        let duplicate = record.pointing_to_node[0].clone();
        record.pointing_to_node.push(duplicate);

        let error = InteractionNode::try_from(record).expect_err("two open branches must fail");
        assert!(matches!(error, GraphError::MultipleOpenBranches { .. }));
    }
}
