//! Interaction-graph data model for captured LLM runs.
//!
//! A session's conversation is recorded as a tree of [`InteractionNode`]s:
//! plain messages chain through single continuation children, while tool
//! calls fan out as `function_call` children that carry their own sub-flows.
//! [`navigator`] holds the pure read algorithms over that tree and
//! [`record::GraphRecord`] is the serialized document the visualizer reads.

pub mod errors;
pub mod navigator;
pub mod node;
pub mod record;

pub use errors::*;
pub use navigator::*;
pub use node::*;
pub use record::*;
