use crate::messages::MessageEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to obtain a model response. Always fatal to the run.
#[derive(Debug, Error)]
#[error("model invocation failed: {message}")]
pub struct ModelError {
    pub message: String,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A tool-call request issued by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    /// Raw JSON argument string as issued.
    pub arguments: String,
}

/// One item of a model response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Text { text: String },
    FunctionCall(FunctionCall),
}

/// Model response surface the coordinator consumes: output items plus the
/// concatenated text output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub output: Vec<OutputItem>,
    pub output_text: String,
}

impl ModelResponse {
    /// A plain final answer with no tool calls.
    pub fn text(output_text: impl Into<String>) -> Self {
        let output_text = output_text.into();
        Self {
            output: vec![OutputItem::Text {
                text: output_text.clone(),
            }],
            output_text,
        }
    }

    /// A response requesting the given tool calls.
    pub fn tool_calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            output: calls.into_iter().map(OutputItem::FunctionCall).collect(),
            output_text: String::new(),
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall(call) => Some(call),
                OutputItem::Text { .. } => None,
            })
            .collect()
    }
}

/// Model invocation boundary. The client behind it is out of scope; the
/// coordinator only needs a callable from message sequence to response.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, messages: &[MessageEntry]) -> Result<ModelResponse, ModelError>;
}
