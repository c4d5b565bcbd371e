//! Persistence boundary for captured interaction graphs.
//!
//! A [`GraphSink`] receives the full session tree after every mutation.
//! Exactly one sink is configured per coordinator: the filesystem sink
//! writes one JSON document per session, the callback sink hands the tree
//! to caller code, and the in-memory sink retains the latest snapshot for
//! tests.

pub mod callback;
pub mod fs;
pub mod memory;
pub mod sink;

pub use callback::*;
pub use fs::*;
pub use memory::*;
pub use sink::*;
