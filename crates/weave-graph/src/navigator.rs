//! Pure read algorithms over an interaction tree.

use crate::node::InteractionNode;

/// Depth-first search for the `function_call` node whose value is `call_id`.
/// Absence is a value; callers decide whether it is fatal.
pub fn locate_tool_call<'a>(
    root: &'a InteractionNode,
    call_id: &str,
) -> Option<&'a InteractionNode> {
    if root.role.is_function_call() && root.value == call_id {
        return Some(root);
    }
    for child in root.child_nodes() {
        if let Some(found) = locate_tool_call(child, call_id) {
            return Some(found);
        }
    }
    None
}

/// Frontier node where the next conversational message attaches: follow
/// continuation children until none remain. A node whose only children are
/// pending tool calls is its own tip.
pub fn open_thread_tip(node: &InteractionNode) -> &InteractionNode {
    match node.continuation() {
        Some(next) => open_thread_tip(next),
        None => node,
    }
}

/// Result of walking the open-thread path below a node for one agent name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentRunOverlap {
    /// Consecutive trailing nodes on the path authored by the agent,
    /// counting outward from the tip.
    pub run_len: usize,
    /// Whether any node on the path was authored by a different agent.
    pub interrupted: bool,
}

/// Walk the open-thread path from `node` to its tip and measure how much of
/// it the given agent already owns. The trailing count is the resume offset
/// into that agent's next submitted message sequence.
pub fn matching_agent_run_length(agent_name: &str, node: &InteractionNode) -> AgentRunOverlap {
    let mut run_len = 0usize;
    let mut interrupted = false;
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if current.agent_name == agent_name {
            run_len += 1;
        } else {
            run_len = 0;
            interrupted = true;
        }
        cursor = current.continuation();
    }
    AgentRunOverlap {
        run_len,
        interrupted,
    }
}
