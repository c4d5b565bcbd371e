use crate::errors::AgentError;
use serde::{Deserialize, Serialize};
use weave_graph::NodeRole;

/// Role of a plain conversational message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Developer,
}

impl From<MessageRole> for NodeRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::System => NodeRole::System,
            MessageRole::User => NodeRole::User,
            MessageRole::Assistant => NodeRole::Assistant,
            MessageRole::Developer => NodeRole::Developer,
        }
    }
}

/// One entry of a submitted message sequence: a plain message, a tool-call
/// request, or a tool-call output fed back to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEntry {
    Message { role: MessageRole, content: String },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput { call_id: String, output: String },
}

impl MessageEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self::Message {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::Message {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Message {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self::Message {
            role: MessageRole::Developer,
            content: content.into(),
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Message { .. })
    }
}

/// How an incoming sequence relates to the one stored for a (session, agent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceFit {
    /// The incoming sequence strictly extends the stored one.
    Extends,
    /// The incoming sequence is unrelated to the stored one.
    Diverges,
}

/// Strict-prefix comparison. Plain entries compare by role and content,
/// structured entries by call id. Entries of different kinds at the same
/// index make the sequences incomparable, which is fatal.
pub fn sequence_fit(
    stored: &[MessageEntry],
    incoming: &[MessageEntry],
) -> Result<SequenceFit, AgentError> {
    if incoming.len() <= stored.len() {
        return Ok(SequenceFit::Diverges);
    }
    for (index, (previous, current)) in stored.iter().zip(incoming).enumerate() {
        let matches = match (previous, current) {
            (
                MessageEntry::Message {
                    role: stored_role,
                    content: stored_content,
                },
                MessageEntry::Message { role, content },
            ) => stored_role == role && stored_content == content,
            (
                MessageEntry::FunctionCall {
                    call_id: stored_id, ..
                },
                MessageEntry::FunctionCall { call_id, .. },
            ) => stored_id == call_id,
            (
                MessageEntry::FunctionCallOutput {
                    call_id: stored_id, ..
                },
                MessageEntry::FunctionCallOutput { call_id, .. },
            ) => stored_id == call_id,
            _ => return Err(AgentError::SequenceKindMismatch { index }),
        };
        if !matches {
            return Ok(SequenceFit::Diverges);
        }
    }
    Ok(SequenceFit::Extends)
}

/// Drop structured entries, leaving the plain messages that become nodes.
pub(crate) fn visible_messages(messages: &[MessageEntry]) -> Vec<(MessageRole, String)> {
    messages
        .iter()
        .filter_map(|entry| match entry {
            MessageEntry::Message { role, content } => Some((*role, content.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_fit_strict_extension_expected_extends() {
        let stored = vec![MessageEntry::system("s"), MessageEntry::user("u")];
        let incoming = vec![
            MessageEntry::system("s"),
            MessageEntry::user("u"),
            MessageEntry::assistant("a"),
        ];
        assert_eq!(
            sequence_fit(&stored, &incoming).expect("comparable sequences"),
            SequenceFit::Extends
        );
    }

    #[test]
    fn sequence_fit_equal_sequences_expected_diverges() {
        let stored = vec![MessageEntry::system("s"), MessageEntry::user("u")];
        assert_eq!(
            sequence_fit(&stored, &stored.clone()).expect("comparable sequences"),
            SequenceFit::Diverges
        );
    }

    #[test]
    fn sequence_fit_changed_content_expected_diverges() {
        let stored = vec![MessageEntry::system("s"), MessageEntry::user("u")];
        let incoming = vec![
            MessageEntry::system("s"),
            MessageEntry::user("different"),
            MessageEntry::assistant("a"),
        ];
        assert_eq!(
            sequence_fit(&stored, &incoming).expect("comparable sequences"),
            SequenceFit::Diverges
        );
    }

    #[test]
    fn sequence_fit_structured_entries_compare_by_call_id() {
        let stored = vec![MessageEntry::FunctionCall {
            call_id: "c1".to_string(),
            name: "grep".to_string(),
            arguments: "{}".to_string(),
        }];
        let incoming = vec![
            MessageEntry::FunctionCall {
                call_id: "c1".to_string(),
                name: "renamed".to_string(),
                arguments: "{\"q\":1}".to_string(),
            },
            MessageEntry::FunctionCallOutput {
                call_id: "c1".to_string(),
                output: "hit".to_string(),
            },
        ];
        assert_eq!(
            sequence_fit(&stored, &incoming).expect("comparable sequences"),
            SequenceFit::Extends
        );
    }

    #[test]
    fn sequence_fit_kind_mismatch_expected_fatal() {
        let stored = vec![MessageEntry::system("s")];
        let incoming = vec![
            MessageEntry::FunctionCall {
                call_id: "c1".to_string(),
                name: "grep".to_string(),
                arguments: "{}".to_string(),
            },
            MessageEntry::user("u"),
        ];
        let error = sequence_fit(&stored, &incoming).expect_err("kinds differ");
        assert!(matches!(
            error,
            AgentError::SequenceKindMismatch { index: 0 }
        ));
    }

    #[test]
    fn visible_messages_drops_structured_entries() {
        let messages = vec![
            MessageEntry::system("s"),
            MessageEntry::FunctionCall {
                call_id: "c1".to_string(),
                name: "grep".to_string(),
                arguments: "{}".to_string(),
            },
            MessageEntry::FunctionCallOutput {
                call_id: "c1".to_string(),
                output: "hit".to_string(),
            },
            MessageEntry::user("u"),
        ];
        let visible = visible_messages(&messages);
        assert_eq!(
            visible,
            vec![
                (MessageRole::System, "s".to_string()),
                (MessageRole::User, "u".to_string()),
            ]
        );
    }
}
