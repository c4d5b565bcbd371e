use crate::model::FunctionCall;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// A tool implementation failing. Recoverable when the descriptor carries an
/// error converter, fatal otherwise.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

/// Tool implementation: parsed JSON arguments plus the call id, returning
/// the output string fed back to the model.
pub type ToolExecutor = Arc<dyn Fn(Value, String) -> ToolFuture + Send + Sync>;

/// Maps a tool failure to the string recorded and fed back instead.
pub type ToolErrorConverter = Arc<dyn Fn(&ToolError) -> String + Send + Sync>;

/// One call of an iteration as seen by the parallelism predicate, together
/// with every sibling call requested in the same model turn.
#[derive(Clone, Copy, Debug)]
pub struct ToolCallContext<'a> {
    pub name: &'a str,
    pub arguments: &'a str,
    pub call_id: &'a str,
    pub siblings: &'a [FunctionCall],
}

pub type ParallelPredicate = Arc<dyn Fn(&ToolCallContext<'_>) -> bool + Send + Sync>;

/// Registered tool: implementation plus the optional failure converter and
/// parallelism policy. Calls run sequentially unless the predicate opts in.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub executor: ToolExecutor,
    pub error_converter: Option<ToolErrorConverter>,
    pub parallel: Option<ParallelPredicate>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        executor: impl Fn(Value, String) -> ToolFuture + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            executor: Arc::new(executor),
            error_converter: None,
            parallel: None,
        }
    }

    pub fn with_error_converter(
        mut self,
        converter: impl Fn(&ToolError) -> String + Send + Sync + 'static,
    ) -> Self {
        self.error_converter = Some(Arc::new(converter));
        self
    }

    pub fn with_parallel(
        mut self,
        predicate: impl Fn(&ToolCallContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.parallel = Some(Arc::new(predicate));
        self
    }

    /// Convenience for tools that are always safe to run concurrently.
    pub fn always_parallel(self) -> Self {
        self.with_parallel(|_| true)
    }

    pub fn may_run_parallel(&self, context: &ToolCallContext<'_>) -> bool {
        match &self.parallel {
            Some(predicate) => predicate(context),
            None => false,
        }
    }
}

/// Name-keyed set of the tools registered for one run.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolSet {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        let mut set = Self::default();
        for descriptor in descriptors {
            set.register(descriptor);
        }
        set
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
