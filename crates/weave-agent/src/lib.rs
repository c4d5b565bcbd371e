//! Session orchestration for captured LLM-plus-tool runs.
//!
//! The [`RunCoordinator`] drives one agent turn: it routes the caller's
//! message sequence into the session tree kept by the [`SessionRegistry`],
//! then iterates model invocations and tool executions until the model
//! produces a final answer, flushing the tree to a
//! [`weave_sink::GraphSink`] after every mutation.

pub mod coordinator;
pub mod errors;
pub mod messages;
pub mod model;
pub mod registry;
pub mod tools;

pub use coordinator::*;
pub use errors::*;
pub use messages::*;
pub use model::*;
pub use registry::*;
pub use tools::*;
