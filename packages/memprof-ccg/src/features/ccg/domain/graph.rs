//! Calling context graph storage
//!
//! Owns the node and edge arenas, the context-id registry, and the
//! lookup maps binding program calls to graph nodes. The call->node
//! maps are insertion-ordered; iteration over them is observable in
//! the output, and determinism requires a fixed order.

use crate::features::ccg::domain::node::{ContextEdge, ContextNode, EdgeId, NodeId};
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::{AllocTypes, AllocationType, CallInfo, ContextId, StackId};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Counters reported alongside the transformation result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisambiguationStats {
    /// Function clones materialized during assignment
    pub function_clones: usize,

    /// Node clones created (graph cloning + assignment splits)
    pub node_clones: usize,

    /// Allocation versions annotated not-cold
    pub allocs_not_cold: usize,

    /// Allocation versions annotated cold
    pub allocs_cold: usize,
}

/// Graph of profiled allocation contexts for one program
///
/// Nodes represent allocations and the interior callsites of their
/// profiled contexts; edges carry the context ids flowing along each
/// caller->callee hop. The graph owns its source flavor and applies
/// cloning decisions through it.
pub struct CallsiteContextGraph<S: CallsiteSource> {
    pub(crate) source: S,

    pub(crate) nodes: Vec<ContextNode<S::Call>>,
    pub(crate) edges: Vec<ContextEdge>,

    /// Each context id's label; exactly one entry per minted id
    pub(crate) context_id_to_allocation_type: BTreeMap<ContextId, AllocationType>,

    /// Stack id -> the node created for it during MIB ingestion
    pub(crate) stack_entry_id_to_node: FxHashMap<StackId, NodeId>,

    /// Call -> node maps; insertion-ordered (iteration drives output)
    pub(crate) alloc_call_to_node: IndexMap<CallInfo<S::Call>, NodeId>,
    pub(crate) non_alloc_call_to_node: IndexMap<CallInfo<S::Call>, NodeId>,

    /// Enclosing function of each node that has one
    pub(crate) node_to_calling_func: FxHashMap<NodeId, S::Func>,

    /// Per function, the calls carrying profile metadata, in program order
    pub(crate) func_to_calls_with_metadata: Vec<(S::Func, Vec<CallInfo<S::Call>>)>,

    /// Last minted context id; ids start at 1
    pub(crate) last_context_id: ContextId,

    pub(crate) stats: DisambiguationStats,
}

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            nodes: Vec::new(),
            edges: Vec::new(),
            context_id_to_allocation_type: BTreeMap::new(),
            stack_entry_id_to_node: FxHashMap::default(),
            alloc_call_to_node: IndexMap::new(),
            non_alloc_call_to_node: IndexMap::new(),
            node_to_calling_func: FxHashMap::default(),
            func_to_calls_with_metadata: Vec::new(),
            last_context_id: 0,
            stats: DisambiguationStats::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Release the graph, handing back the (updated) source
    pub fn into_source(self) -> S {
        self.source
    }

    pub fn stats(&self) -> &DisambiguationStats {
        &self.stats
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &ContextNode<S::Call> {
        &self.nodes[id]
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> &ContextEdge {
        &self.edges[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Label registered for a context id
    pub fn allocation_type(&self, id: ContextId) -> AllocationType {
        self.context_id_to_allocation_type[&id]
    }

    /// Mint a fresh context id with the given label
    pub(crate) fn mint_context_id(&mut self, label: AllocationType) -> ContextId {
        self.last_context_id += 1;
        self.context_id_to_allocation_type
            .insert(self.last_context_id, label);
        self.last_context_id
    }

    pub(crate) fn new_node(&mut self, is_allocation: bool, call: CallInfo<S::Call>) -> NodeId {
        self.nodes.push(ContextNode::new(is_allocation, call));
        self.nodes.len() - 1
    }

    /// Register `clone` as a clone of `node`, threading through to the
    /// original if `node` is itself a clone.
    pub(crate) fn add_clone(&mut self, node: NodeId, clone: NodeId) {
        let orig = self.get_orig_node(node);
        self.nodes[orig].clones.push(clone);
        assert!(self.nodes[clone].clone_of.is_none());
        self.nodes[clone].clone_of = Some(orig);
    }

    #[inline]
    pub(crate) fn get_orig_node(&self, node: NodeId) -> NodeId {
        self.nodes[node].clone_of.unwrap_or(node)
    }

    /// Node for an allocation call, if one was created
    pub fn get_node_for_alloc(&self, call: &CallInfo<S::Call>) -> Option<NodeId> {
        self.alloc_call_to_node.get(call).copied()
    }

    /// Node for any call (allocation first, then interior callsite)
    pub fn get_node_for_inst(&self, call: &CallInfo<S::Call>) -> Option<NodeId> {
        self.get_node_for_alloc(call)
            .or_else(|| self.non_alloc_call_to_node.get(call).copied())
    }

    /// Node created for a profiled stack id, if any
    pub fn get_node_for_stack_id(&self, stack_id: StackId) -> Option<NodeId> {
        self.stack_entry_id_to_node.get(&stack_id).copied()
    }

    /// Alloc nodes in creation order
    pub fn alloc_nodes(&self) -> Vec<NodeId> {
        self.alloc_call_to_node.values().copied().collect()
    }

    /// OR of the labels of the given context ids, bailing once both
    /// labels have been seen.
    pub(crate) fn compute_alloc_type(&self, context_ids: &FxHashSet<ContextId>) -> AllocTypes {
        let mut alloc_type = AllocTypes::NONE;
        for &id in context_ids {
            alloc_type.insert(self.context_id_to_allocation_type[&id]);
            if alloc_type == AllocTypes::BOTH {
                return alloc_type;
            }
        }
        alloc_type
    }

    /// Label union over the intersection of two context id sets,
    /// iterating the smaller set.
    pub(crate) fn intersect_alloc_types(
        &self,
        ids_a: &FxHashSet<ContextId>,
        ids_b: &FxHashSet<ContextId>,
    ) -> AllocTypes {
        let (small, large) = if ids_a.len() < ids_b.len() {
            (ids_a, ids_b)
        } else {
            (ids_b, ids_a)
        };
        let mut alloc_type = AllocTypes::NONE;
        for &id in small {
            if !large.contains(&id) {
                continue;
            }
            alloc_type.insert(self.context_id_to_allocation_type[&id]);
            if alloc_type == AllocTypes::BOTH {
                return alloc_type;
            }
        }
        alloc_type
    }

    /// Create an edge and wire it into both endpoints' adjacency lists
    pub(crate) fn add_edge(
        &mut self,
        callee: NodeId,
        caller: NodeId,
        alloc_types: AllocTypes,
        context_ids: FxHashSet<ContextId>,
    ) -> EdgeId {
        self.edges
            .push(ContextEdge::new(callee, caller, alloc_types, context_ids));
        let edge = self.edges.len() - 1;
        self.nodes[callee].caller_edges.push(edge);
        self.nodes[caller].callee_edges.push(edge);
        edge
    }

    /// Augment the edge from `caller` into `callee` with one context,
    /// creating the edge if absent.
    pub(crate) fn add_or_update_caller_edge(
        &mut self,
        callee: NodeId,
        caller: NodeId,
        alloc_type: AllocationType,
        context_id: ContextId,
    ) {
        for &edge in &self.nodes[callee].caller_edges {
            if self.edges[edge].caller == caller {
                self.edges[edge].alloc_types.insert(alloc_type);
                self.edges[edge].context_ids.insert(context_id);
                return;
            }
        }
        let mut ids = FxHashSet::default();
        ids.insert(context_id);
        self.add_edge(callee, caller, AllocTypes::of(alloc_type), ids);
    }

    /// Edge in `node`'s callee list pointing at `callee`
    pub(crate) fn find_edge_from_callee(&self, node: NodeId, callee: NodeId) -> Option<EdgeId> {
        self.nodes[node]
            .callee_edges
            .iter()
            .copied()
            .find(|&edge| self.edges[edge].callee == callee)
    }

    /// Edge in `node`'s caller list coming from `caller`
    pub(crate) fn find_edge_from_caller(&self, node: NodeId, caller: NodeId) -> Option<EdgeId> {
        self.nodes[node]
            .caller_edges
            .iter()
            .copied()
            .find(|&edge| self.edges[edge].caller == caller)
    }

    pub(crate) fn erase_callee_edge(&mut self, node: NodeId, edge: EdgeId) {
        let list = &mut self.nodes[node].callee_edges;
        let pos = list
            .iter()
            .position(|&e| e == edge)
            .expect("edge present in callee list");
        list.remove(pos);
    }

    pub(crate) fn erase_caller_edge(&mut self, node: NodeId, edge: EdgeId) {
        let list = &mut self.nodes[node].caller_edges;
        let pos = list
            .iter()
            .position(|&e| e == edge)
            .expect("edge present in caller list");
        list.remove(pos);
    }

    /// Detach an edge from both endpoints
    pub(crate) fn remove_edge(&mut self, edge: EdgeId) {
        let callee = self.edges[edge].callee;
        let caller = self.edges[edge].caller;
        self.erase_caller_edge(callee, edge);
        self.erase_callee_edge(caller, edge);
    }

    /// True when the edge is still attached to `node`'s caller list.
    /// Snapshot iterations use this to skip edges a recursive step
    /// already moved or removed.
    pub(crate) fn caller_edge_attached(&self, node: NodeId, edge: EdgeId) -> bool {
        self.nodes[node].caller_edges.contains(&edge)
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        let node = &self.nodes[id];
        write!(f, "Node {id}")?;
        if node.is_allocation {
            write!(f, " (alloc)")?;
        }
        if node.recursive {
            write!(f, " (recursive)")?;
        }
        if !node.has_call() {
            write!(f, " null call")?;
        }
        writeln!(f, " orig id {}", node.orig_stack_or_alloc_id)?;
        writeln!(f, "\tAllocTypes: {}", node.alloc_types)?;
        let mut ids: Vec<ContextId> = node.context_ids.iter().copied().collect();
        ids.sort_unstable();
        write!(f, "\tContextIds:")?;
        for id in ids {
            write!(f, " {id}")?;
        }
        writeln!(f)?;
        writeln!(f, "\tCalleeEdges:")?;
        for &edge in &node.callee_edges {
            self.fmt_edge(f, edge)?;
        }
        writeln!(f, "\tCallerEdges:")?;
        for &edge in &node.caller_edges {
            self.fmt_edge(f, edge)?;
        }
        if !node.clones.is_empty() {
            write!(f, "\tClones:")?;
            for clone in &node.clones {
                write!(f, " {clone}")?;
            }
            writeln!(f)?;
        } else if let Some(orig) = node.clone_of {
            writeln!(f, "\tClone of {orig}")?;
        }
        Ok(())
    }

    fn fmt_edge(&self, f: &mut fmt::Formatter<'_>, id: EdgeId) -> fmt::Result {
        let edge = &self.edges[id];
        let mut ids: Vec<ContextId> = edge.context_ids.iter().copied().collect();
        ids.sort_unstable();
        write!(
            f,
            "\t\tEdge from Callee {} to Caller {} AllocTypes: {} ContextIds:",
            edge.callee, edge.caller, edge.alloc_types
        )?;
        for id in ids {
            write!(f, " {id}")?;
        }
        writeln!(f)
    }
}

impl<S: CallsiteSource> fmt::Display for CallsiteContextGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Callsite Context Graph:")?;
        for id in 0..self.nodes.len() {
            if self.nodes[id].is_removed() {
                continue;
            }
            self.fmt_node(f, id)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
