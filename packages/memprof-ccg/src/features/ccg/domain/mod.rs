//! Graph data model

pub mod graph;
pub mod node;
pub mod verify;

pub use graph::{CallsiteContextGraph, DisambiguationStats};
pub use node::{ContextEdge, ContextNode, EdgeId, NodeId};
