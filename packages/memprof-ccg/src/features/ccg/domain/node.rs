//! Graph nodes and edges
//!
//! Nodes represent either an allocation call or an interior callsite in
//! a profiled context. Both node and edge storage is arena-based: the
//! graph owns two `Vec`s and adjacency lists hold indices, so an edge
//! is jointly referenced by its two endpoints and every removal must go
//! through the graph helpers that update both sides.

use crate::shared::models::{AllocTypes, CallInfo, ContextId};
use rustc_hash::FxHashSet;

/// Index of a node in the graph arena. Nodes are never deallocated,
/// only logically emptied.
pub type NodeId = usize;

/// Index of an edge in the graph arena
pub type EdgeId = usize;

/// Node in the calling context graph
#[derive(Debug, Clone)]
pub struct ContextNode<C> {
    /// Allocation call vs. interior callsite
    pub is_allocation: bool,

    /// Set when a stack id repeats within one MIB chain (mutual
    /// recursion); such nodes never take a call binding and are never
    /// cloned.
    pub recursive: bool,

    /// The corresponding allocation or interior call
    pub call: CallInfo<C>,

    /// For stack nodes, the original profile stack id; for alloc nodes,
    /// the first context id minted for the allocation. Used for callsite
    /// matching and labeling only, so clones don't get a value.
    pub orig_stack_or_alloc_id: u64,

    /// OR of the labels of all contexts including this node
    pub alloc_types: AllocTypes,

    /// Edges to callees in the profiled call stacks
    pub callee_edges: Vec<EdgeId>,

    /// Edges to callers in the profiled call stacks
    pub caller_edges: Vec<EdgeId>,

    /// Ids of contexts including this node
    pub context_ids: FxHashSet<ContextId>,

    /// Clones of this node, if any
    pub clones: Vec<NodeId>,

    /// Original node if this is a clone
    pub clone_of: Option<NodeId>,
}

impl<C> ContextNode<C> {
    pub fn new(is_allocation: bool, call: CallInfo<C>) -> Self {
        Self {
            is_allocation,
            recursive: false,
            call,
            orig_stack_or_alloc_id: 0,
            alloc_types: AllocTypes::NONE,
            callee_edges: Vec::new(),
            caller_edges: Vec::new(),
            context_ids: FxHashSet::default(),
            clones: Vec::new(),
            clone_of: None,
        }
    }

    #[inline]
    pub fn has_call(&self) -> bool {
        self.call.has_call()
    }

    /// True once the node has been logically emptied; its context id
    /// set and both adjacency lists are then all empty.
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.context_ids.is_empty()
    }
}

/// Edge between a callee node and a caller node
#[derive(Debug, Clone)]
pub struct ContextEdge {
    pub callee: NodeId,
    pub caller: NodeId,

    /// OR of the labels of all contexts traversing this edge
    pub alloc_types: AllocTypes,

    /// Ids of contexts traversing this caller->callee hop
    pub context_ids: FxHashSet<ContextId>,
}

impl ContextEdge {
    pub fn new(
        callee: NodeId,
        caller: NodeId,
        alloc_types: AllocTypes,
        context_ids: FxHashSet<ContextId>,
    ) -> Self {
        Self {
            callee,
            caller,
            alloc_types,
            context_ids,
        }
    }
}
